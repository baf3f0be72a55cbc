//! Delete-cache command - remove entries from the remote cache

use crate::cache_api::{CacheApiClient, DeleteCacheRequest};
use crate::cli::args::DeleteCacheArgs;
use crate::config::Config;
use crate::error::{StickyDiskError, StickyResult};
use crate::ui::{self, UiContext};

/// Execute the delete-cache command
pub async fn execute(args: DeleteCacheArgs, config: &Config) -> StickyResult<()> {
    let ctx = UiContext::detect();
    let request = DeleteCacheRequest {
        key: args.key,
        version: args.version.filter(|v| !v.is_empty()),
        prefix: args.prefix,
    };
    request.validate()?;

    let client = CacheApiClient::from_config(&config.cache_api, &config.job)?;
    let outcome = {
        let request = request.clone();
        tokio::task::spawn_blocking(move || client.delete(&request))
            .await
            .map_err(|e| StickyDiskError::Internal(format!("cache delete task failed: {e}")))??
    };

    for line in outcome.messages(&request) {
        ui::step_ok(&ctx, &line);
    }
    Ok(())
}
