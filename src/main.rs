use log::{error, info};

use summarize_proxy::config::ProxyConfig;

#[tokio::main]
async fn main()
{   dotenv::dotenv().ok();
    env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = match ProxyConfig::from_env()
    {   Ok(config) => config
      , Err(e) => {
          error!("{}", e);
          std::process::exit(1);
        }
    };

    if let Err(e) = summarize_proxy::serve(&config).await
    {   error!("{}", e);
        std::process::exit(1);
    }
    info!("Server stopped");
}
