use std::fmt;

pub const NUM_CLASSES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefectClass {
    One,
    Two,
    Three,
    Four,
}

impl DefectClass {
    pub const ALL: [DefectClass; NUM_CLASSES] = [
        DefectClass::One,
        DefectClass::Two,
        DefectClass::Three,
        DefectClass::Four,
    ];

    /// Class from its 1-based competition id.
    pub fn from_id(id: usize) -> Option<Self> {
        id.checked_sub(1).and_then(Self::from_channel)
    }

    /// Class from its 0-based channel in mask and prediction tensors.
    pub fn from_channel(channel: usize) -> Option<Self> {
        Self::ALL.get(channel).copied()
    }

    pub fn id(self) -> usize {
        self.channel() + 1
    }

    pub fn channel(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DefectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_based() {
        assert_eq!(DefectClass::from_id(1), Some(DefectClass::One));
        assert_eq!(DefectClass::from_id(4), Some(DefectClass::Four));
        assert_eq!(DefectClass::from_id(0), None);
        assert_eq!(DefectClass::from_id(5), None);
        assert_eq!(DefectClass::Three.channel(), 2);
        assert_eq!(DefectClass::Three.to_string(), "3");
    }
}
