//! The `local` backend: the path is already a file on this host; verify it
//! is a playable video and record it.

use async_trait::async_trait;
use std::path::Path;

use super::{DownloadBackend, Outcome};
use crate::constants;
use crate::entities::qitem_source;
use crate::state::AppContext;
use crate::strategy::StrategyError;
use crate::video::probe;
use crate::workers::try_make_relative;

pub struct LocalBackend;

#[async_trait]
impl DownloadBackend for LocalBackend {
    fn platform(&self) -> &str {
        constants::PLATFORM_LOCAL
    }

    async fn download(
        &self,
        ctx: &AppContext,
        source: &qitem_source::Model,
    ) -> Result<Outcome, StrategyError> {
        let path = Path::new(&source.path);
        if !path.exists() {
            return Err(StrategyError::InvalidSource(format!(
                "file {:?} does not exist",
                source.path
            )));
        }
        let ok = probe::has_video_and_audio(path)
            .await
            .map_err(StrategyError::Other)?;
        if !ok {
            return Err(StrategyError::InvalidSource(format!(
                "file {:?} is not a video or has no audio stream",
                source.path
            )));
        }

        let local_fp = try_make_relative(path);
        ctx.store
            .sources()
            .set_local_fp(source.id, &local_fp.display().to_string())
            .await
            .map_err(StrategyError::Other)?;
        Ok(Outcome::Completed)
    }
}
