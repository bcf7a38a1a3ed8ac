#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = keystone::bootstrap::init_base();

    keystone::bootstrap::init_server(&env)
        .await
        .inspect_err(|err| tracing::error!("fatal error: {:?}", err))
}
