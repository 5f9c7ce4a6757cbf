//! Training and evaluation passes.

use crate::{
    checkpoint::{Checkpointer, FILE_STRFTIME},
    common::*,
    config::Config,
    data::{batches, BatchSource},
    logging::EventLogger,
    utils::RateCounter,
    visualize,
};

/// The dataset a pass iterates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Train,
    Val,
    Test,
}

impl PassKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The reduced result of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    /// The mean total loss.
    pub loss: f64,
    /// Means of every other collected value.
    pub metrics: IndexMap<String, f64>,
}

impl PassSummary {
    fn from_collector(collector: &Collector) -> Result<Self> {
        let mut metrics = collector.means();
        let loss = metrics
            .shift_remove("total_loss")
            .ok_or_else(|| format_err!("no loss was collected"))?;
        Ok(Self { loss, metrics })
    }
}

/// Evaluation results of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train: PassSummary,
    pub val: PassSummary,
    pub test: PassSummary,
}

/// The datasets of each pass kind.
#[derive(Debug)]
pub struct Datasets {
    pub train: Box<dyn BatchSource>,
    pub val: Box<dyn BatchSource>,
    pub test: Box<dyn BatchSource>,
}

impl Datasets {
    pub fn get(&self, kind: PassKind) -> &dyn BatchSource {
        match kind {
            PassKind::Train => &*self.train,
            PassKind::Val => &*self.val,
            PassKind::Test => &*self.test,
        }
    }
}

/// Network outputs and projection of one batch.
struct BatchOutput {
    mask_logits: Array3<f32>,
    predicted: Array3<bool>,
    projection: Projection,
    class_logits: Option<Array2<f32>>,
    segm_loss: f64,
    proj_loss: f64,
}

impl BatchOutput {
    fn class_logits(&self) -> Option<ArrayView2<'_, f32>> {
        self.class_logits.as_ref().map(|logits| logits.view())
    }
}

/// Runs the segmentation network and the patch classifier over the datasets.
pub struct Trainer<S, C>
where
    S: Segmenter + SaveWeights,
    C: Classifier + SaveWeights,
{
    config: Config,
    segmenter: S,
    classifier: C,
    datasets: Rc<Datasets>,
    projector: BatchProjector,
    ap_calculator: MeanApCalculator,
    run_dir: PathBuf,
    logger: EventLogger,
    checkpointer: Checkpointer,
    global_step: usize,
}

impl<S, C> Trainer<S, C>
where
    S: Segmenter + SaveWeights,
    C: Classifier + SaveWeights,
{
    /// Creates a timestamped run directory under the logging directory and
    /// saves the configuration there.
    pub fn new(config: Config, segmenter: S, classifier: C, datasets: Datasets) -> Result<Self> {
        let run_dir = config
            .logging
            .dir
            .join(format!("{}", Local::now().format(FILE_STRFTIME)));
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create run dir '{}'", run_dir.display()))?;

        let config_path = run_dir.join("config.json");
        let text = serde_json::to_string_pretty(&config)?;
        fs::write(&config_path, text)
            .with_context(|| format!("failed to write '{}'", config_path.display()))?;

        let projector = config.projection.build_projector()?;
        let ap_calculator = config.metrics.build_calculator()?;
        let logger = EventLogger::new(&run_dir)?;
        let checkpointer = Checkpointer::new(&run_dir)?;

        info!("training run directory '{}'", run_dir.display());

        Ok(Self {
            config,
            segmenter,
            classifier,
            datasets: Rc::new(datasets),
            projector,
            ap_calculator,
            run_dir,
            logger,
            checkpointer,
            global_step: 0,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    fn batch_size(&self, kind: PassKind) -> NonZeroUsize {
        let sizes = &self.config.training.batch_size;
        match kind {
            PassKind::Train => sizes.train,
            PassKind::Val => sizes.val,
            PassKind::Test => sizes.test,
        }
    }

    /// Runs every epoch. Each epoch trains, evaluates on all datasets,
    /// writes the current checkpoints and keeps the ones with the lowest
    /// validation loss.
    pub fn train(&mut self) -> Result<Vec<EpochSummary>> {
        self.global_step = 0;
        let epochs = self.config.training.epochs;
        let mut summaries = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            self.train_epoch(epoch)?;

            let train = self.calc_metrics(epoch, PassKind::Train)?;
            info!("train loss epoch[{}] = {}", epoch, train.loss);
            let val = self.calc_metrics(epoch, PassKind::Val)?;
            info!("val loss epoch[{}] = {}", epoch, val.loss);
            let test = self.calc_metrics(epoch, PassKind::Test)?;
            info!("test loss epoch[{}] = {}", epoch, test.loss);

            let per_kind = |train: f64, val: f64, test: f64| -> IndexMap<String, f64> {
                vec![
                    ("train".to_string(), train),
                    ("val".to_string(), val),
                    ("test".to_string(), test),
                ]
                .into_iter()
                .collect()
            };
            self.logger.add_scalars(
                "epoch/total_loss",
                epoch,
                &per_kind(train.loss, val.loss, test.loss),
            )?;
            for name in train.metrics.keys() {
                let get = |summary: &PassSummary| summary.metrics.get(name).copied().unwrap_or(0.0);
                self.logger.add_scalars(
                    &format!("epoch/{}", name),
                    epoch,
                    &per_kind(get(&train), get(&val), get(&test)),
                )?;
            }

            self.checkpointer.save_current("model", &self.segmenter)?;
            self.checkpointer.save_current("classifier", &self.classifier)?;
            self.checkpointer.update_best(val.loss)?;
            self.logger.flush()?;

            summaries.push(EpochSummary {
                epoch,
                train,
                val,
                test,
            });
        }

        Ok(summaries)
    }

    /// Runs one training pass with region filtering and unchunked
    /// classification, logging per-batch statistics.
    pub fn train_epoch(&mut self, epoch: usize) -> Result<PassSummary> {
        let kind = PassKind::Train;
        let datasets = self.datasets.clone();
        let source = datasets.get(kind);
        ensure!(source.num_samples() > 0, "the {} dataset is empty", kind);

        let mut collector = Collector::new();
        let mut rate_counter = RateCounter::with_second_interval();

        for (batch_index, batch) in batches(source, self.batch_size(kind)).enumerate() {
            let batch = batch?;
            let output = self.forward_batch(&batch, true)?;
            let batch_metrics = self.record_batch(&mut collector, &batch, &output, true)?;
            let step = self.global_step;

            let projection = &output.projection;
            if !projection.not_enough_rects() {
                let num_regions = projection.num_regions() as f64;
                let (sum_w, sum_h) = projection
                    .regions
                    .iter()
                    .fold((0.0, 0.0), |(sum_w, sum_h), region| {
                        (sum_w + region.rect.w() as f64, sum_h + region.rect.h() as f64)
                    });
                let sizes: IndexMap<String, f64> = vec![
                    ("W".to_string(), sum_w / num_regions),
                    ("H".to_string(), sum_h / num_regions),
                ]
                .into_iter()
                .collect();
                self.logger.add_scalars("batch/mean", step, &sizes)?;
                self.logger
                    .add_scalar("batch/proj_B_size/train", step, num_regions)?;
            }
            self.logger.add_scalars("batch", step, &batch_metrics)?;

            let class_dist = self.class_distribution(projection);
            self.logger
                .add_scalars("batch/proj_class_dist", step, &class_dist)?;

            if batch_index == 0 {
                self.write_images(kind, epoch, &batch, &output)?;
            }

            self.global_step += 1;
            rate_counter.add(1.0);
            if let Some(rate) = rate_counter.rate() {
                info!("{}[{}]: {:.2} batches/s", kind, epoch, rate);
            }
        }

        PassSummary::from_collector(&collector)
    }

    /// Runs one evaluation pass without region filtering and with chunked
    /// classification.
    pub fn val_epoch(&mut self, epoch: usize, kind: PassKind) -> Result<PassSummary> {
        let datasets = self.datasets.clone();
        let source = datasets.get(kind);
        ensure!(source.num_samples() > 0, "the {} dataset is empty", kind);

        let mut collector = Collector::new();

        for (batch_index, batch) in batches(source, self.batch_size(kind)).enumerate() {
            let batch = batch?;
            let output = self.forward_batch(&batch, false)?;
            let batch_metrics = self.record_batch(&mut collector, &batch, &output, true)?;
            debug!("{}[{}] batch {}: {:?}", kind, epoch, batch_index, batch_metrics);

            if batch_index == 0 {
                self.write_images(kind, epoch, &batch, &output)?;
            }
        }

        PassSummary::from_collector(&collector)
    }

    /// Runs an evaluation pass and adds the corpus-level `AP` and the mean
    /// per-image `IOU` to the summary.
    pub fn calc_metrics(&mut self, epoch: usize, kind: PassKind) -> Result<PassSummary> {
        let datasets = self.datasets.clone();
        let source = datasets.get(kind);
        ensure!(source.num_samples() > 0, "the {} dataset is empty", kind);

        let mut collector = Collector::new();
        let mut boxes = BoundingBoxes::new();
        let mut relative_index = 0;
        let mut ious = vec![];

        for (batch_index, batch) in batches(source, self.batch_size(kind)).enumerate() {
            let batch = batch?;
            let output = self.forward_batch(&batch, false)?;
            self.record_batch(&mut collector, &batch, &output, false)?;

            ious.extend(metrics::iou_score(
                output.mask_logits.view(),
                batch.masks.view(),
                Reduce::None,
            )?);
            boxes.extend(create_boxes(
                &output.projection,
                output.class_logits(),
                relative_index,
            )?);
            relative_index += batch.batch_size();

            if batch_index == 0 {
                self.write_images(kind, epoch, &batch, &output)?;
            }
        }

        let mean_ap = self.ap_calculator.from_boxes(&boxes);
        info!(
            "{}[{}] AP {:?}",
            kind,
            epoch,
            mean_ap
                .per_class
                .iter()
                .map(|class_ap| (class_ap.class.index(), class_ap.ap))
                .collect_vec()
        );

        let mut summary = PassSummary::from_collector(&collector)?;
        summary.metrics.insert("AP".to_string(), mean_ap.map);
        summary
            .metrics
            .insert("IOU".to_string(), ious.iter().sum::<f64>() / ious.len() as f64);
        Ok(summary)
    }

    /// Segments, projects and classifies one batch.
    ///
    /// Training mode filters small regions and classifies all patches at
    /// once. Evaluation mode keeps every region and classifies in chunks.
    fn forward_batch(&mut self, batch: &Batch, train: bool) -> Result<BatchOutput> {
        let mask_logits = self.segmenter.forward_t(batch.images.view(), train)?;
        ensure!(
            mask_logits.dim() == batch.masks.dim(),
            "the segmenter outputs shape {:?}, but expect {:?}",
            mask_logits.dim(),
            batch.masks.dim()
        );
        let segm_loss = metrics::bce_with_logits(mask_logits.view(), batch.masks.view())?;

        let predicted = binarize_logits(mask_logits.view());
        let projection = self.projector.project(
            batch.images.view(),
            predicted.view(),
            &batch.class_masks,
            train,
        )?;

        let class_logits = if projection.not_enough_rects() {
            None
        } else {
            let chunk_size = if train {
                projection.num_regions()
            } else {
                self.config.training.classifier_chunk_size.get()
            };
            let logits = classify_chunked(
                &mut self.classifier,
                projection.patches.view(),
                chunk_size,
                train,
            )?;
            ensure!(
                logits.ncols() == self.classifier.num_classes(),
                "the classifier outputs {} classes, but expect {}",
                logits.ncols(),
                self.classifier.num_classes()
            );
            Some(logits)
        };

        let proj_loss = match &class_logits {
            Some(logits) => metrics::cross_entropy(&projection, logits.view())?,
            None => 0.0,
        };

        Ok(BatchOutput {
            mask_logits,
            predicted,
            projection,
            class_logits,
            segm_loss,
            proj_loss,
        })
    }

    /// Adds the batch statistics to the collector and returns them.
    fn record_batch(
        &self,
        collector: &mut Collector,
        batch: &Batch,
        output: &BatchOutput,
        batch_ap: bool,
    ) -> Result<IndexMap<String, f64>> {
        let projection = &output.projection;
        let mut values = IndexMap::new();

        values.insert("total_loss", output.segm_loss + output.proj_loss);
        values.insert("proj_loss", output.proj_loss);
        values.insert("segm_loss", output.segm_loss);

        let iou = metrics::iou_score(output.mask_logits.view(), batch.masks.view(), Reduce::Mean)?;
        values.insert("metric_iou", iou.iter().copied().sum());

        let accuracy = match output.class_logits() {
            Some(logits) => metrics::matched_accuracy(projection, logits)?,
            None => None,
        };
        values.insert("metric_proj_acc", accuracy.unwrap_or(0.0));

        if let Some(rate) = metrics::found_rate(projection) {
            values.insert("metric_found_rects", rate);
        }
        if let Some(fraction) = metrics::matched_fraction(projection) {
            values.insert("metric_matched_rects", fraction);
        }

        if batch_ap {
            if let Some(logits) = output.class_logits() {
                let mean_ap = self.ap_calculator.for_batch(projection, logits)?;
                values.insert("VOC_Metrics_AP", mean_ap.map);
            }
        }

        Ok(values
            .into_iter()
            .map(|(name, value)| {
                collector.add(name, value);
                (name.to_string(), value)
            })
            .collect())
    }

    /// Counts true classes of the regions, with an `unmatched` bucket.
    fn class_distribution(&self, projection: &Projection) -> IndexMap<String, f64> {
        let num_classes = self.classifier.num_classes();
        let mut counts: IndexMap<String, f64> = (0..num_classes)
            .map(|class| (class.to_string(), 0.0))
            .chain(iter::once(("unmatched".to_string(), 0.0)))
            .collect();

        projection.regions.iter().for_each(|region| {
            let key = region.true_class.to_string();
            *counts.entry(key).or_insert(0.0) += 1.0;
        });
        counts
    }

    fn write_images(&mut self, kind: PassKind, epoch: usize, batch: &Batch, output: &BatchOutput) -> Result<()> {
        if !self.config.logging.enable_images {
            return Ok(());
        }

        let regions = output
            .class_logits()
            .map(|logits| (&output.projection, logits));
        let images = visualize::render_batch(batch.images.view(), output.predicted.view(), regions)?;

        for (index, image) in images.iter().enumerate() {
            self.logger
                .add_image(&format!("{}/image-{}", kind, index + 1), epoch, image)?;
        }
        Ok(())
    }
}
