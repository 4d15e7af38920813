// CLI backend commands: serve, check

use std::path::{Path, PathBuf};

use crate::daemon::analyzer::DiveCli;
use crate::daemon::{self, ServeOptions};

/// dive-in serve
pub async fn cmd_serve(
    config: Option<&Path>,
    data_dir: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    socket: Option<PathBuf>,
) -> anyhow::Result<()> {
    daemon::start_daemon(ServeOptions {
        config_path: config.map(Path::to_path_buf),
        data_dir: data_dir.map(Path::to_path_buf),
        host,
        port,
        socket_path: socket,
    })
    .await
}

/// dive-in check
pub fn cmd_check(config: Option<&Path>) -> anyhow::Result<()> {
    let config = daemon::load_config(config)?;
    let runner = DiveCli::new(config.dive_path.clone());

    match runner.locate() {
        Some(path) => {
            println!("Dive is installed: {}", path.display());
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "Dive is not found (looked for '{}')",
            config.dive_path
        )),
    }
}
