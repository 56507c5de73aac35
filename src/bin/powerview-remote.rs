use clap::Parser;
use log::{error, info};
use powerview_remote::cli::{run, Cli};
use powerview_remote::error::AppRunError;
use powerview_remote::init_logging;

fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();

    init_logging(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    info!(concat!("PowerView Remote ", env!("CARGO_PKG_VERSION")));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match runtime.block_on(run(cli)) {
        Err(err) if err.is_already_running() => {
            error!("Another powerview-remote is already running");
            Err(err)
        },
        Err(err) => {
            error!("{}", err);
            Err(err)
        },
        Ok(()) => Ok(()),
    }
}
