//! Active-search record: the best assignment seen by any evaluation rollout.

use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// File name of the persisted record inside the save directory.
pub const SOLUTION_FILE: &str = "solution.json";

/// Best evaluation result of a run plus run totals.
///
/// Serialized field names are kept stable so existing result files stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveSearchRecord {
    /// Episode at which the best count was found.
    pub episode: usize,
    /// Samples consumed when the best count was found.
    pub samples: usize,
    pub num_sat: usize,
    /// `greedy` or `sampled-<k>`.
    pub strategy: Option<String>,
    /// Winning assignment, one 0/1 value per variable.
    pub sol: Option<Vec<u8>>,
    pub total_episodes: usize,
    pub total_samples: usize,
    #[serde(rename = "trainable params")]
    pub trainable_params: usize,
}

impl ActiveSearchRecord {
    pub fn new(trainable_params: usize) -> Self {
        Self {
            trainable_params,
            ..Default::default()
        }
    }

    /// Keep `assignment` if it beats the current best. Ties keep the earlier one.
    ///
    /// Returns whether the record changed.
    pub fn observe(
        &mut self,
        episode: usize,
        samples: usize,
        num_sat: usize,
        strategy: &str,
        assignment: &[u8],
    ) -> bool {
        if num_sat <= self.num_sat {
            return false;
        }
        self.num_sat = num_sat;
        self.episode = episode;
        self.samples = samples;
        self.strategy = Some(strategy.to_string());
        self.sol = Some(assignment.to_vec());
        true
    }

    /// Stamp the run totals at the end of an evaluation cycle.
    pub fn close_cycle(&mut self, episode: usize, samples: usize) {
        self.total_episodes = episode;
        self.total_samples = samples;
    }

    /// Overwrite `path` with the record, via a sibling temp file and rename.
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let file = std::fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move record into {}", path.display()))?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}
