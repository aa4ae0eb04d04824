use clap::Parser;
use trigger_engine::env::{Env, setup_tracing};
use trigger_engine::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let env = Env::try_parse()?;
    setup_tracing(&env);
    run(env).await?;
    Ok(())
}
