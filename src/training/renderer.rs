use std::sync::mpsc::Sender;

use burn::train::renderer::{MetricState, MetricsRenderer, TrainingProgress};

/// Reports training progress through the `log` facade.
///
/// Numeric metrics are logged every `every` iterations and at the end of each epoch. Once
/// the learner has processed its last event, a message is sent on `done`.
pub struct LogRenderer {
    every: usize,
    metrics: Vec<String>,
    done: Option<Sender<()>>,
}

impl LogRenderer {
    pub fn new(every: usize, done: Sender<()>) -> Self {
        Self {
            every: every.max(1),
            metrics: Vec::new(),
            done: Some(done),
        }
    }

    fn collect(&mut self, state: MetricState) {
        if let MetricState::Numeric(entry, _) = state {
            self.metrics.push(format!("{} {}", entry.name, entry.formatted));
        }
    }

    fn render(&mut self, split: &str, item: TrainingProgress) {
        let metrics = std::mem::take(&mut self.metrics);

        let epoch_done = item.progress.items_processed >= item.progress.items_total;
        if !epoch_done && item.iteration % self.every != 0 {
            return;
        }

        log::info!(
            "[{} - Epoch {}/{} - Iteration {}] {}",
            split,
            item.epoch,
            item.epoch_total,
            item.iteration,
            metrics.join(" | ")
        );
    }
}

impl MetricsRenderer for LogRenderer {
    fn update_train(&mut self, state: MetricState) {
        self.collect(state);
    }

    fn update_valid(&mut self, state: MetricState) {
        self.collect(state);
    }

    fn render_train(&mut self, item: TrainingProgress) {
        self.render("Train", item);
    }

    fn render_valid(&mut self, item: TrainingProgress) {
        self.render("Valid", item);
    }

    fn on_train_end(&mut self) -> Result<(), Box<dyn core::error::Error>> {
        if let Some(done) = self.done.take() {
            done.send(())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use burn::data::dataloader::Progress;
    use burn::train::metric::MetricEntry;

    use super::*;

    fn progress(items_processed: usize, iteration: usize) -> TrainingProgress {
        TrainingProgress {
            progress: Progress {
                items_processed,
                items_total: 8,
            },
            epoch: 1,
            epoch_total: 2,
            iteration,
        }
    }

    #[test]
    fn metrics_are_dropped_after_each_render() {
        let (sender, _receiver) = mpsc::channel();
        let mut renderer = LogRenderer::new(4, sender);

        let entry = MetricEntry::new("Loss".into(), "epoch 0.5 - batch 0.5".into(), "0.5".into());
        renderer.update_train(MetricState::Numeric(entry, 0.5));
        assert_eq!(renderer.metrics, ["Loss epoch 0.5 - batch 0.5"]);

        renderer.render_train(progress(2, 1));
        assert!(renderer.metrics.is_empty());
    }

    #[test]
    fn signals_the_end_of_training_once() {
        let (sender, receiver) = mpsc::channel();
        let mut renderer = LogRenderer::new(1, sender);

        renderer.on_train_end().unwrap();
        renderer.on_train_end().unwrap();

        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }
}
