//! Checkpoint files of the current and the best model.

use crate::common::*;

/// The time format of run directory names.
pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

/// Saves the latest weights every epoch and keeps a copy of the weights with
/// the lowest loss.
#[derive(Debug)]
pub struct Checkpointer {
    dir: PathBuf,
    best_loss: Option<f64>,
    names: Vec<String>,
}

impl Checkpointer {
    pub fn new<P>(dir: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref().to_owned();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir '{}'", dir.display()))?;
        Ok(Self {
            dir,
            best_loss: None,
            names: vec![],
        })
    }

    pub fn current_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("current_{}.ckpt", name))
    }

    pub fn best_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("best_{}.ckpt", name))
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best_loss
    }

    /// Writes `current_{name}.ckpt`.
    pub fn save_current<W>(&mut self, name: &str, weights: &W) -> Result<PathBuf>
    where
        W: SaveWeights + ?Sized,
    {
        let path = self.current_path(name);
        weights
            .save(&path)
            .with_context(|| format!("failed to save checkpoint '{}'", path.display()))?;
        if !self.names.iter().any(|saved| saved == name) {
            self.names.push(name.to_string());
        }
        Ok(path)
    }

    /// Copies every current checkpoint to its best counterpart if `loss` is
    /// lower than any loss seen before. The first call always copies.
    pub fn update_best(&mut self, loss: f64) -> Result<bool> {
        let is_better = match self.best_loss {
            Some(best_loss) => loss < best_loss,
            None => true,
        };
        if !is_better {
            return Ok(false);
        }

        for name in &self.names {
            let from = self.current_path(name);
            let to = self.best_path(name);
            fs::copy(&from, &to).with_context(|| {
                format!("failed to copy '{}' to '{}'", from.display(), to.display())
            })?;
        }

        info!("upgrade in loss: {:?} -> {:.5}", self.best_loss, loss);
        self.best_loss = Some(loss);
        Ok(true)
    }
}
