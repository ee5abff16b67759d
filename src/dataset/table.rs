use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

use derive_new::new;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::DatasetError;
use crate::defect::{DefectClass, NUM_CLASSES};
use crate::mask::{Mask, Shape};
use crate::rle;

/// One line of the competition CSV: one class channel of one image.
#[derive(Debug, Serialize, Deserialize)]
struct ClassRecord {
    #[serde(rename = "ImageId_ClassId")]
    image_class_id: String,
    #[serde(rename = "EncodedPixels", default)]
    encoded_pixels: String,
}

#[derive(Debug, Serialize)]
struct ImageRecord<'a> {
    #[serde(rename = "ImageId")]
    image_id: &'a str,
    e1: &'a str,
    e2: &'a str,
    e3: &'a str,
    e4: &'a str,
    count: usize,
}

/// Encodings of the four defect classes of one image. Absent classes are empty strings.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct DefectRow {
    pub image_id: String,
    pub encoded: [String; NUM_CLASSES],
}

impl DefectRow {
    pub fn encoded(&self, class: DefectClass) -> &str {
        &self.encoded[class.channel()]
    }

    pub fn has_defect(&self, class: DefectClass) -> bool {
        !self.encoded(class).is_empty()
    }

    /// Number of classes with a non-empty encoding.
    pub fn count(&self) -> usize {
        self.encoded.iter().filter(|e| !e.is_empty()).count()
    }

    pub fn decode_masks(
        &self,
        native: Shape,
        output: Shape,
    ) -> Result<[Mask; NUM_CLASSES], DatasetError> {
        let [m1, m2, m3, m4] = DefectClass::ALL.map(|class| {
            rle::decode(self.encoded(class), native, output).map_err(|source| {
                DatasetError::InvalidEncoding {
                    image_id: self.image_id.clone(),
                    class,
                    source,
                }
            })
        });

        Ok([m1?, m2?, m3?, m4?])
    }
}

/// The training table with one row per image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefectTable {
    rows: Vec<DefectRow>,
}

impl DefectTable {
    pub fn new(rows: Vec<DefectRow>) -> Self {
        Self { rows }
    }

    /// Rows for images without any known encoding, e.g. the test set.
    pub fn from_image_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ids.into_iter()
                .map(|id| DefectRow::new(id.into(), Default::default()))
                .collect(),
        )
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads an `ImageId_ClassId,EncodedPixels` CSV where every 4 consecutive lines hold
    /// classes 1 to 4 of the same image.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let records: Vec<ClassRecord> = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader)
            .deserialize()
            .collect::<Result<_, _>>()?;

        if records.len() % NUM_CLASSES != 0 {
            return Err(DatasetError::IncompleteGroup(records.len()));
        }

        let rows = records
            .chunks_exact(NUM_CLASSES)
            .enumerate()
            .map(|(group, chunk)| {
                let start = group * NUM_CLASSES;
                let mut image_id: Option<&str> = None;

                for (offset, record) in chunk.iter().enumerate() {
                    let (id, class) = split_image_class_id(&record.image_class_id)?;
                    if class.channel() != offset || image_id.is_some_and(|prev| prev != id) {
                        return Err(DatasetError::MalformedGroup { start });
                    }
                    image_id = Some(id);
                }

                Ok(DefectRow {
                    image_id: image_id.unwrap_or_default().to_string(),
                    encoded: [0, 1, 2, 3].map(|i| chunk[i].encoded_pixels.trim().to_string()),
                })
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;

        log::debug!("Grouped {} class rows into {} images", records.len(), rows.len());
        Ok(Self { rows })
    }

    /// Writes the restructured `ImageId,e1,e2,e3,e4,count` table.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DatasetError> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            let [e1, e2, e3, e4] = &row.encoded;
            writer.serialize(ImageRecord {
                image_id: &row.image_id,
                e1,
                e2,
                e3,
                e4,
                count: row.count(),
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the competition layout, four `ImageId_ClassId,EncodedPixels` lines per image.
    pub fn write_class_csv<W: Write>(&self, writer: W) -> Result<(), DatasetError> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            for class in DefectClass::ALL {
                writer.serialize(ClassRecord {
                    image_class_id: format!("{}_{}", row.image_id, class.id()),
                    encoded_pixels: row.encoded(class).to_string(),
                })?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[DefectRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&DefectRow> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DefectRow> {
        self.rows.iter()
    }

    /// Splits after the first `floor(fraction * len)` rows.
    pub fn split_at_fraction(&self, fraction: f64) -> (Self, Self) {
        let index = ((fraction.clamp(0.0, 1.0) * self.len() as f64) as usize).min(self.len());
        let (head, tail) = self.rows.split_at(index);
        (Self::new(head.to_vec()), Self::new(tail.to_vec()))
    }

    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&DefectRow) -> bool,
    {
        Self::new(self.rows.iter().filter(|row| predicate(row)).cloned().collect())
    }

    /// Keeps the rows at `indices`, in table order and without duplicates.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let keep: BTreeSet<usize> = indices.iter().copied().collect();
        Self::new(
            keep.into_iter()
                .filter_map(|i| self.rows.get(i).cloned())
                .collect(),
        )
    }

    /// Draws up to `n` distinct row indices whose `class` encoding is non-empty.
    pub fn sample_indices_with_defect<R: Rng + ?Sized>(
        &self,
        class: DefectClass,
        n: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        let candidates: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.has_defect(class))
            .map(|(i, _)| i)
            .collect();

        if candidates.len() < n {
            log::warn!(
                "Only {} images with defect {} available, {} requested",
                candidates.len(),
                class,
                n
            );
        }

        candidates.choose_multiple(rng, n).copied().collect()
    }
}

fn split_image_class_id(value: &str) -> Result<(&str, DefectClass), DatasetError> {
    value
        .rsplit_once('_')
        .and_then(|(id, class)| {
            let class = class.parse::<usize>().ok().and_then(DefectClass::from_id)?;
            (!id.is_empty()).then_some((id, class))
        })
        .ok_or_else(|| DatasetError::InvalidImageClassId(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TRAIN_CSV: &str = "\
ImageId_ClassId,EncodedPixels
0002cc93b.jpg_1,29102 12 29346 24
0002cc93b.jpg_2,
0002cc93b.jpg_3,
0002cc93b.jpg_4,
00031f466.jpg_1,
00031f466.jpg_2,
00031f466.jpg_3,
00031f466.jpg_4,
0007a71bf.jpg_1,
0007a71bf.jpg_2,
0007a71bf.jpg_3,18661 28 18863 82
0007a71bf.jpg_4,1 5
";

    fn table() -> DefectTable {
        DefectTable::from_reader(TRAIN_CSV.as_bytes()).unwrap()
    }

    #[test]
    fn groups_four_rows_per_image() {
        let table = table();
        assert_eq!(table.len(), 3);

        let first = table.row(0).unwrap();
        assert_eq!(first.image_id, "0002cc93b.jpg");
        assert_eq!(first.encoded(DefectClass::One), "29102 12 29346 24");
        assert_eq!(first.count(), 1);

        assert_eq!(table.row(1).unwrap().count(), 0);

        let third = table.row(2).unwrap();
        assert!(third.has_defect(DefectClass::Three));
        assert!(third.has_defect(DefectClass::Four));
        assert!(!third.has_defect(DefectClass::One));
        assert_eq!(third.count(), 2);
    }

    #[test]
    fn rejects_out_of_order_classes() {
        let csv = "\
ImageId_ClassId,EncodedPixels
a.jpg_1,
a.jpg_3,
a.jpg_2,
a.jpg_4,
";
        assert!(matches!(
            DefectTable::from_reader(csv.as_bytes()),
            Err(DatasetError::MalformedGroup { start: 0 })
        ));
    }

    #[test]
    fn rejects_mixed_images_and_partial_groups() {
        let mixed = "\
ImageId_ClassId,EncodedPixels
a.jpg_1,
a.jpg_2,
b.jpg_3,
a.jpg_4,
";
        assert!(matches!(
            DefectTable::from_reader(mixed.as_bytes()),
            Err(DatasetError::MalformedGroup { start: 0 })
        ));

        let partial = "ImageId_ClassId,EncodedPixels\na.jpg_1,\n";
        assert!(matches!(
            DefectTable::from_reader(partial.as_bytes()),
            Err(DatasetError::IncompleteGroup(1))
        ));

        let bad_id = "ImageId_ClassId,EncodedPixels\na.jpg,\na.jpg,\na.jpg,\na.jpg,\n";
        assert!(matches!(
            DefectTable::from_reader(bad_id.as_bytes()),
            Err(DatasetError::InvalidImageClassId(_))
        ));
    }

    #[test]
    fn writes_restructured_table() {
        let mut out = Vec::new();
        table().write_csv(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines[0], "ImageId,e1,e2,e3,e4,count");
        assert_eq!(lines[1], "0002cc93b.jpg,29102 12 29346 24,,,,1");
        assert_eq!(lines[3], "0007a71bf.jpg,,,18661 28 18863 82,1 5,2");
    }

    #[test]
    fn class_csv_reads_back() {
        let mut out = Vec::new();
        table().write_class_csv(&mut out).unwrap();

        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with(
            "ImageId_ClassId,EncodedPixels\n0002cc93b.jpg_1,29102 12 29346 24\n"
        ));
        assert_eq!(DefectTable::from_reader(out.as_slice()).unwrap(), table());
    }

    #[test]
    fn test_ids_have_no_encodings() {
        let table = DefectTable::from_image_ids(["a.jpg", "b.jpg"]);
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|row| row.count() == 0));
    }

    #[test]
    fn split_uses_the_floor_of_the_fraction() {
        let (train, valid) = table().split_at_fraction(0.8);
        assert_eq!(train.len(), 2);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid.row(0).unwrap().image_id, "0007a71bf.jpg");
    }

    #[test]
    fn subset_keeps_table_order() {
        let subset = table().subset(&[2, 0, 2]);
        let ids: Vec<_> = subset.iter().map(|r| r.image_id.as_str()).collect();
        assert_eq!(ids, vec!["0002cc93b.jpg", "0007a71bf.jpg"]);
    }

    #[test]
    fn samples_only_defective_rows() {
        let mut rng = StdRng::seed_from_u64(7);
        let table = table();

        let picked = table.sample_indices_with_defect(DefectClass::Three, 4, &mut rng);
        assert_eq!(picked, vec![2]);
        assert!(table
            .sample_indices_with_defect(DefectClass::Two, 1, &mut rng)
            .is_empty());
    }

    #[test]
    fn decodes_all_classes() {
        let row = DefectRow::new(
            "x.jpg".to_string(),
            ["1 2".to_string(), String::new(), String::new(), "3 1".to_string()],
        );
        let masks = row.decode_masks([4, 4], [4, 4]).unwrap();
        assert_eq!(masks[0].count(), 2);
        assert!(masks[1].is_empty());
        assert!(masks[3].get(2, 0));

        let bad = DefectRow::new(
            "y.jpg".to_string(),
            ["1".to_string(), String::new(), String::new(), String::new()],
        );
        assert!(matches!(
            bad.decode_masks([4, 4], [4, 4]),
            Err(DatasetError::InvalidEncoding {
                class: DefectClass::One,
                ..
            })
        ));
    }
}
