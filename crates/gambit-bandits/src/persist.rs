//! Whole-state persistence as a versioned JSON document.
//!
//! The document holds the configuration, the choice tallies and the
//! strategy's learning state (`strategy_state`). On load the strategy is
//! rebuilt from its configuration and handed that state back, so
//! order-dependent state such as Exp3 weights or the EpsilonFirst exploration
//! budget survives a restart. Random generators are not stored: a seeded
//! coordinator restarts its stream from the seed.
//!
//! Documents without a usable `strategy_state` fall back to replaying the
//! tallies in bulk: `total` zero-reward observations, then `success`
//! rewarded ones. The resulting statistics match the live ones, but state
//! that depends on the observation order is only approximated.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use gambit_core::Strategy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::coordinator::State;
use crate::{BanditError, Choice, Coordinator, CoordinatorConfig, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot<V> {
    version: u32,
    #[serde(with = "time::serde::iso8601")]
    epoch_start: OffsetDateTime,
    config: CoordinatorConfig,
    lever_count: usize,
    choices: Vec<ChoiceRecord<V>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strategy_state: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChoiceRecord<V> {
    id: Uuid,
    value: V,
    total: u64,
    success: u64,
}

fn io_error(path: &Path, source: std::io::Error) -> BanditError {
    BanditError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl<T: Serialize> Coordinator<T> {
    /// Writes the whole state to `path`.
    ///
    /// The document goes to a temporary file next to `path` that only
    /// replaces it once fully written, so a failed save leaves the previous
    /// file untouched. Failures are logged and returned, never panicked on.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = self.state.lock();
        let strategy_state = self.strategy.lock().snapshot();
        let result = write_snapshot(path, &state, strategy_state);
        match &result {
            Ok(()) => debug_event!("saved {} choices to {}", state.choices.len(), path.display()),
            Err(e) => warn_event!("failed to save state to {}: {e}", path.display()),
        }
        result
    }
}

fn write_snapshot<T: Serialize>(
    path: &Path,
    state: &State<T>,
    strategy_state: Value,
) -> Result<()> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        epoch_start: state.epoch_start,
        config: state.config.clone(),
        lever_count: state.choices.len(),
        choices: state
            .choices
            .iter()
            .map(|c| ChoiceRecord {
                id: c.id(),
                value: c.value(),
                total: c.total(),
                success: c.success(),
            })
            .collect(),
        strategy_state: Some(strategy_state).filter(|v| !v.is_null()),
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.flush().map_err(|e| io_error(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

impl<T: DeserializeOwned> Coordinator<T> {
    /// Loads a coordinator saved with [`Coordinator::save`]. A missing file
    /// yields a fresh, empty coordinator with the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_or(path, CoordinatorConfig::default())
    }

    /// Like [`Coordinator::load`], with `config` for the missing-file case.
    pub fn load_or(path: impl AsRef<Path>, config: CoordinatorConfig) -> Result<Self> {
        let path = path.as_ref();
        match read_snapshot(path)? {
            Some(snapshot) => {
                let (state, strategy) = restore(snapshot)?;
                Ok(Self::from_parts(state, strategy))
            }
            None => Self::new(config),
        }
    }

    /// Replaces this coordinator's state with the one saved at `path`, under
    /// the coordinator lock. A missing file empties the coordinator but keeps
    /// its configuration. On error the current state is kept.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.state.lock();
        let (next, strategy) = match read_snapshot(path)? {
            Some(snapshot) => restore(snapshot)?,
            None => {
                let config = state.config.clone();
                let mut strategy = config.strategy.build(config.seed)?;
                strategy.set_lever_count(0);
                let fresh = State {
                    config,
                    choices: Vec::new(),
                    epoch_start: OffsetDateTime::now_utc(),
                };
                (fresh, strategy)
            }
        };
        *state = next;
        *self.strategy.lock() = strategy;
        Ok(())
    }
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<T>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn restore<T>(snapshot: Snapshot<T>) -> Result<(State<T>, Box<dyn Strategy>)> {
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(BanditError::SnapshotVersion {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    if snapshot.lever_count != snapshot.choices.len() {
        return Err(BanditError::InconsistentSnapshot(format!(
            "lever_count {} but {} choices",
            snapshot.lever_count,
            snapshot.choices.len()
        )));
    }
    if let Some(bad) = snapshot.choices.iter().find(|c| c.success > c.total) {
        return Err(BanditError::InconsistentSnapshot(format!(
            "choice {} has {} successes out of {} displays",
            bad.id, bad.success, bad.total
        )));
    }

    let config = snapshot.config;
    config.validate()?;
    let tallies: Vec<(u64, u64)> = snapshot
        .choices
        .iter()
        .map(|c| (c.total, c.success))
        .collect();
    let strategy = match snapshot.strategy_state {
        Some(saved) => match resume(&config, saved, &tallies)? {
            Some(strategy) => strategy,
            None => replay(&config, &tallies)?,
        },
        None => replay(&config, &tallies)?,
    };

    let mut choices = Vec::with_capacity(snapshot.choices.len());
    for (index, record) in snapshot.choices.into_iter().enumerate() {
        choices.push(Arc::new(Choice::restored(
            record.id,
            record.value,
            index,
            record.total,
            record.success,
        )));
    }

    Ok((
        State {
            config,
            choices,
            epoch_start: snapshot.epoch_start,
        },
        strategy,
    ))
}

/// Rebuilds the strategy from its saved learning state. Returns `None` when
/// the state does not fit the strategy or disagrees with the tallies.
fn resume(
    config: &CoordinatorConfig,
    saved: Value,
    tallies: &[(u64, u64)],
) -> Result<Option<Box<dyn Strategy>>> {
    let mut strategy = config.strategy.build(config.seed)?;
    strategy.set_lever_count(tallies.len());
    if let Err(e) = strategy.load(saved) {
        warn_event!("stored {} state unusable, replaying tallies: {e}", strategy.name());
        return Ok(None);
    }

    let stats = strategy.stats();
    let consistent = stats.lever_count() == tallies.len()
        && tallies.iter().enumerate().all(|(index, &(total, success))| {
            stats.count(index) == total.saturating_add(success)
        });
    if !consistent {
        warn_event!("stored {} state disagrees with tallies, replaying", strategy.name());
        return Ok(None);
    }
    Ok(Some(strategy))
}

/// Rebuilds the strategy by feeding it every tally: each display is a
/// zero-reward observation and each success a rewarded one.
fn replay(config: &CoordinatorConfig, tallies: &[(u64, u64)]) -> Result<Box<dyn Strategy>> {
    let mut strategy = config.strategy.build(config.seed)?;
    strategy.set_lever_count(tallies.len());
    for (index, &(total, success)) in tallies.iter().enumerate() {
        strategy.observe_n(index, 0.0, total);
        strategy.observe_n(index, config.success_reward, success);
    }
    Ok(strategy)
}
