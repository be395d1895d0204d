use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use trustgate_auth::{InMemoryUserDirectory, Role};
use trustgate_core::{DEV_SECRET, GateConfig};
use trustgate_observability::{AuditPipeline, BufferedSink, LogFormat, TracingSink};

#[derive(Debug, Parser)]
#[command(name = "trustgate-api", about = "Token-authenticated API gateway with audit logging")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "TRUSTGATE_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// HMAC secret for bearer tokens.
    #[arg(long, env = "TRUSTGATE_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    #[arg(long, env = "TRUSTGATE_TOKEN_TTL_SECS", default_value_t = 86_400)]
    token_ttl_secs: u64,

    #[arg(long, env = "TRUSTGATE_SLOW_MS", default_value_t = 2_000)]
    slow_ms: u64,

    #[arg(long, env = "TRUSTGATE_VERY_SLOW_MS", default_value_t = 5_000)]
    very_slow_ms: u64,

    /// Handler timeout; 0 disables it.
    #[arg(long, env = "TRUSTGATE_HANDLER_TIMEOUT_MS", default_value_t = 30_000)]
    handler_timeout_ms: u64,

    /// Capacity of the audit queue in front of the log writer.
    #[arg(long, env = "TRUSTGATE_AUDIT_QUEUE", default_value_t = 1_024)]
    audit_queue: usize,

    #[arg(long, env = "TRUSTGATE_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[arg(long, env = "TRUSTGATE_ADMIN_USERNAME", default_value = "admin")]
    admin_username: String,

    #[arg(long, env = "TRUSTGATE_ADMIN_EMAIL", default_value = "admin@localhost")]
    admin_email: String,

    /// Seed an administrator with this password at startup.
    #[arg(long, env = "TRUSTGATE_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

impl Args {
    fn gate_config(&self) -> GateConfig {
        let jwt_secret = self.jwt_secret.clone().unwrap_or_else(|| {
            tracing::warn!("TRUSTGATE_JWT_SECRET not set; using insecure dev default");
            DEV_SECRET.to_string()
        });

        GateConfig {
            jwt_secret,
            token_ttl_secs: self.token_ttl_secs,
            slow_request_ms: self.slow_ms,
            very_slow_request_ms: self.very_slow_ms,
            handler_timeout_ms: (self.handler_timeout_ms > 0).then_some(self.handler_timeout_ms),
            ..GateConfig::default()
        }
    }

    fn directory(&self) -> InMemoryUserDirectory {
        let directory = InMemoryUserDirectory::with_default_roles();
        match &self.admin_password {
            Some(password) => {
                directory.insert_user(&self.admin_username, &self.admin_email, password, [Role::ADMIN]);
                tracing::info!(username = %self.admin_username, "seeded admin user");
            }
            None => tracing::warn!("TRUSTGATE_ADMIN_PASSWORD not set; no users can log in"),
        }
        directory
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    trustgate_observability::init_with(args.log_format);

    let config = args.gate_config();
    let (audit_sink, audit_worker) = BufferedSink::spawn(TracingSink, args.audit_queue);
    let audit = AuditPipeline::new(&config).with_sink(Arc::new(audit_sink));

    let app = trustgate_api::build_app(config, Arc::new(args.directory()), audit)
        .context("invalid gate configuration")?;

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // The audit worker drains once every pipeline handle is gone.
    drop(app.services);
    drop(app.gate);
    if let Err(e) = audit_worker.await {
        tracing::warn!(error = %e, "audit worker did not shut down cleanly");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}
