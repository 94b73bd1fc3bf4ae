use std::process;

use botlet::BotletConfig;

#[tokio::main]
async fn main() {
    let config = match BotletConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    if let Err(e) = botlet::run(config).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
