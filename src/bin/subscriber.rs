use color_eyre::Result;
use sensor_console::app::{self, Session};
use sensor_console::config::AppConfig;
use sensor_console::console::{self, BANNER};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    app::setup()?;

    let config = AppConfig::load()?;
    println!("{}", BANNER);

    let mut session = Session::start(&config).await?;
    let mut stdout = std::io::stdout();

    tokio::select! {
        res = console::run_subscriber(&mut session.messages, &mut stdout) => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            return Ok(());
        }
    }

    session.finish().await
}
