//! Data logging toolkit.

use crate::common::*;

/// One scalar event in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub step: usize,
    pub value: f64,
}

/// Writes scalar events as JSON lines and images as PNG files.
#[derive(Debug)]
pub struct EventLogger {
    dir: PathBuf,
    writer: BufWriter<File>,
}

impl EventLogger {
    pub const EVENT_FILE: &'static str = "events.jsonl";
    pub const IMAGE_DIR: &'static str = "images";

    /// Creates the logging directory and an empty event file within.
    pub fn new<P>(dir: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref().to_owned();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create logging dir '{}'", dir.display()))?;

        let event_path = dir.join(Self::EVENT_FILE);
        let file = File::create(&event_path)
            .with_context(|| format!("failed to create event file '{}'", event_path.display()))?;

        Ok(Self {
            dir,
            writer: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn add_scalar(&mut self, tag: impl Into<String>, step: usize, value: f64) -> Result<()> {
        let event = ScalarEvent {
            tag: tag.into(),
            step,
            value,
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Writes each entry as a scalar tagged `{prefix}/{name}`.
    pub fn add_scalars(&mut self, prefix: &str, step: usize, values: &IndexMap<String, f64>) -> Result<()> {
        values
            .iter()
            .try_for_each(|(name, &value)| self.add_scalar(format!("{}/{}", prefix, name), step, value))
    }

    /// Saves the image to `images/<tag>/<step>.png`.
    ///
    /// Slashes in the tag become nested directories.
    pub fn add_image(&mut self, tag: &str, step: usize, image: &RgbImage) -> Result<PathBuf> {
        let image_dir = tag
            .split('/')
            .filter(|component| !component.is_empty() && *component != "." && *component != "..")
            .fold(self.dir.join(Self::IMAGE_DIR), |dir, component| dir.join(component));
        fs::create_dir_all(&image_dir)
            .with_context(|| format!("failed to create image dir '{}'", image_dir.display()))?;

        let path = image_dir.join(format!("{}.png", step));
        image
            .save(&path)
            .with_context(|| format!("failed to save image '{}'", path.display()))?;
        Ok(path)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!("unable to flush events: {:?}", err);
        }
    }
}

/// Reads back all scalar events from an event file.
pub fn read_events<P>(path: P) -> Result<Vec<ScalarEvent>>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read event file '{}'", path.display()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> Result<ScalarEvent> { Ok(serde_json::from_str(line)?) })
        .try_collect()
}
