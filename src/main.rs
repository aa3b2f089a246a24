use color_eyre::Result;
use sensor_console::app::{self, Session};
use sensor_console::config::AppConfig;
use sensor_console::console::{Console, ConsoleError, StopReason, BANNER};
use sensor_console::control::LedState;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    app::setup()?;

    let config = AppConfig::load()?;
    println!("{}", BANNER);

    let mut session = Session::start(&config).await?;
    let mut input = app::spawn_stdin_reader();

    let mut console = Console::new(
        session.handle.clone(),
        LedState::new(),
        config.topics.clone(),
        std::io::stdout(),
    );
    console.print_help()?;

    let outcome = tokio::select! {
        res = console.run(&mut input, &mut session.messages) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            return Ok(());
        }
    };

    match outcome {
        Ok(StopReason::Quit) | Ok(StopReason::InputClosed) => session.shutdown().await,
        Ok(StopReason::StreamClosed) => session.finish().await,
        Err(ConsoleError::Mqtt(e)) => {
            // a failed request means the event loop is gone; report its cause
            error!("Publish failed: {}", e);
            session.finish().await?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
