/*!
 * Image Loader Interface
 */

use crate::core::types::TeamId;

/// Loads a program image into a team's address space
pub trait ImageLoader: Send + Sync {
    /// Load `path` for `team`; the error string is reported to the caller
    fn load(&self, team: TeamId, path: &str, args: &[String]) -> Result<(), String>;
}

/// Loader that accepts every non-empty path
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllImages;

impl ImageLoader for AcceptAllImages {
    fn load(&self, _team: TeamId, path: &str, _args: &[String]) -> Result<(), String> {
        if path.is_empty() {
            return Err("empty image path".to_string());
        }
        Ok(())
    }
}
