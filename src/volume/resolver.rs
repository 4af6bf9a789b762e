//! Finding the next volume of a set.

use std::path::{Path, PathBuf};

use super::naming::next_volume_path;
use super::reader::VolumeReader;
use crate::callback::{CallbackContext, VolumeDecision, VolumeMode, VolumeRequest};
use crate::{Error, Result};

/// How many times a missing volume is offered to the callback before giving up.
const MAX_VOLUME_PROMPTS: usize = 64;

/// Locates continuation volumes.
///
/// Paths passed explicitly at open time take precedence over the computed
/// sibling names when their file names match.
#[derive(Debug, Clone, Default)]
pub struct VolumeResolver {
    explicit: Vec<PathBuf>,
}

impl VolumeResolver {
    /// Creates a resolver with an optional list of known volume paths.
    pub fn new(explicit: Vec<PathBuf>) -> Self {
        Self { explicit }
    }

    /// Returns the path to try for the volume after `current`.
    pub fn candidate(&self, current: &Path) -> PathBuf {
        let computed = next_volume_path(current);
        let Some(name) = computed.file_name() else {
            return computed;
        };
        self.explicit
            .iter()
            .find(|p| p.file_name() == Some(name))
            .cloned()
            .unwrap_or(computed)
    }

    /// Opens the volume following `current`, consulting the callbacks.
    ///
    /// `number` is the zero-based number of the requested volume.
    pub(crate) fn open_next(
        &self,
        current: &Path,
        number: u64,
        callbacks: &CallbackContext,
    ) -> Result<VolumeReader> {
        let mut path = self.candidate(current);
        for _ in 0..MAX_VOLUME_PROMPTS {
            let exists = path.is_file();
            let mode = if exists {
                VolumeMode::Notify
            } else {
                VolumeMode::Ask
            };
            let decision = callbacks.change_volume(&VolumeRequest {
                path: &path,
                number,
                mode,
            });
            match decision {
                VolumeDecision::Cancel => {
                    log::debug!("volume {} change to {:?} cancelled", number, path);
                    return Err(Error::VolumeCancelled {
                        volume: number,
                        path,
                    });
                }
                VolumeDecision::Replace(replacement) => {
                    log::debug!("volume {} replaced by {:?}", number, replacement);
                    if replacement.is_file() {
                        return open_volume(&replacement, number);
                    }
                    path = replacement;
                }
                VolumeDecision::Continue if exists => return open_volume(&path, number),
                VolumeDecision::Continue => {}
            }
        }
        Err(Error::VolumeMissing {
            volume: number,
            path,
            source: None,
        })
    }
}

fn open_volume(path: &Path, number: u64) -> Result<VolumeReader> {
    log::debug!("opening volume {} at {:?}", number, path);
    VolumeReader::open(path).map_err(|e| match e {
        Error::Open { path, source } => Error::VolumeMissing {
            volume: number,
            path,
            source: Some(source),
        },
        other => other,
    })
}
