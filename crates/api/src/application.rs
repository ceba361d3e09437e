// 引入标准库：
// `Path`: 文件路径处理。
// `Arc`: 原子引用计数，用于共享身份提供方。
use std::{path::Path, sync::Arc};

// 仅在 Unix 系统下引入文件系统模块，用于处理 Unix Domain Socket 文件。
#[cfg(unix)]
use std::fs;

// 引入 actix-web 框架组件：
// `middleware::Logger`: HTTP 请求日志中间件。
// `web`: 路由配置和数据提取。
// `App`: 应用程序构造器。
// `HttpServer`: HTTP 服务器。
use actix_web::{middleware::Logger, web, App, HttpServer};

// 引入领域层配置和服务：
// `ApiConfig` / `LedgerConfig` / `OAuthConfig`: 监听地址、余额策略和 Discord 凭据。
// `SessionCache`: 会话指纹缓存。
// `init_telemetry`: 初始化遥测。
use rewards_domain::config::{ApiConfig, ConfigError, LedgerConfig, OAuthConfig};
use rewards_domain::provider::{IdentityProvider, ProviderError};
use rewards_domain::services::{
    cache::SessionCache,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
};
// 引入 Discord OAuth 实现。
use rewards_oauth::DiscordProvider;
// 引入存储层实现。
use rewards_storage::SeaOrmStorage;
// 引入错误宏。
use thiserror::Error;
use tracing::info;

// 引入内部模块：
// 处理函数 handlers。
// 应用状态 AppState。
use crate::{
    handlers::{
        account_handler, adjust_balance_handler, assign_role_handler, create_promocode_handler,
        discord_login_handler, game_login_handler, ledger_handler, list_promocodes_handler,
        list_withdrawals_handler, logout_handler, metrics_handler, nickname_handler,
        redeem_handler, request_withdrawal_handler, withdrawal_history_handler,
        withdrawal_status_handler, ApiError,
    },
    state::AppState,
};

// JSON 解析失败时也返回统一的错误体。
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

// 面向终端用户的路由：登录、账户、兑换码和提现。
pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/auth/game", web::post().to(game_login_handler))
        .route("/api/v1/auth/discord", web::post().to(discord_login_handler))
        .route("/api/v1/auth/logout", web::post().to(logout_handler))
        .route("/api/v1/account", web::get().to(account_handler))
        .route("/api/v1/account/nickname", web::put().to(nickname_handler))
        .route("/api/v1/account/ledger", web::get().to(ledger_handler))
        .route("/api/v1/promocodes/redeem", web::post().to(redeem_handler))
        .route("/api/v1/withdrawals", web::post().to(request_withdrawal_handler))
        .route("/api/v1/withdrawals", web::get().to(withdrawal_history_handler));
}

// 管理路由：每个处理函数内部仍然校验管理员角色。
pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/admin/withdrawals", web::get().to(list_withdrawals_handler))
        .route(
            "/api/v1/admin/withdrawals/{id}/status",
            web::post().to(withdrawal_status_handler),
        )
        .route("/api/v1/admin/promocodes", web::get().to(list_promocodes_handler))
        .route("/api/v1/admin/promocodes", web::post().to(create_promocode_handler))
        .route(
            "/api/v1/admin/accounts/{id}/balance",
            web::post().to(adjust_balance_handler),
        )
        .route(
            "/api/v1/admin/accounts/{id}/role",
            web::post().to(assign_role_handler),
        )
        .route("/metrics", web::get().to(metrics_handler));
}

// 应用程序启动入口函数。
// 返回 `Result<(), BootstrapError>`。
pub async fn run() -> Result<(), BootstrapError> {
    // 1. 加载配置
    let config = ApiConfig::load_from_env()?;
    let ledger_config = LedgerConfig::load_from_env()?;
    let oauth_config = OAuthConfig::load_from_env()?;

    // 2. 初始化遥测 (Telemetry)
    // 根据 "API" 前缀的环境变量配置遥测。
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    // 3. 连接数据库（连接时自动建表）
    // 可选地通过 DATABASE_MAX_CONNECTIONS 调整连接池大小。
    let mut storage_builder = SeaOrmStorage::builder().database_url(config.database_url());
    if let Some(max) = config.database_max_connections() {
        storage_builder = storage_builder.max_connections(max);
    }
    let storage = storage_builder.build().await?;

    // 4. 初始化会话缓存
    let sessions = SessionCache::new(config.session_cache_ttl());

    // 5. 构建应用状态
    // 将存储、缓存、遥测守卫和余额策略组合成 AppState。
    let mut state = AppState::new(
        storage,
        sessions,
        telemetry.clone(),
        telemetry.abuse_tracker(),
        ledger_config,
    );

    // 6. 可选的 Discord 登录
    // 未配置凭据时 `/auth/discord` 返回 503。
    if let Some(oauth_config) = oauth_config {
        let provider: Arc<dyn IdentityProvider> = Arc::new(DiscordProvider::new(oauth_config)?);
        state = state.with_discord(provider);
        info!("discord sign-in enabled");
    }

    // 判断是否在公共接口上暴露管理路由和指标端点。
    // 如果配置了内部监听器（Internal Listener），则只在内部接口暴露，公共接口不暴露。
    let include_admin_on_public = !config.has_internal_listener();

    // 克隆 state 用于公共服务器闭包。
    let public_state = state.clone();

    // 7. 配置并创建公共 HTTP 服务器 (Public Server)
    // `move ||` 闭包会在每个 worker 线程中执行，构建 App 实例。
    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            // 注入共享状态数据
            .app_data(web::Data::new(public_state.clone()))
            .app_data(json_config())
            // 添加日志中间件
            .wrap(Logger::default())
            // 注册终端用户路由
            .configure(public_routes);

        // 没有内部监听器时，管理路由退回公共接口（仍然校验角色）。
        if include_admin_on_public {
            app = app.configure(admin_routes);
        }

        app
    });

    // 绑定公共服务器地址。
    // Unix 系统下支持 Unix Domain Socket (UDS)。
    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            // 如果配置了 UDS，先清理可能存在的旧 socket 文件。
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            // 否则绑定 TCP 地址。
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    // 非 Unix 系统（如 Windows）不支持 UDS。
    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    // 运行公共服务器（非阻塞，返回 Server 句柄）。
    let public_server = public_server.run();

    // 8. 配置并创建内部 HTTP 服务器 (Internal Server) - 可选
    // 内部服务器承载管理路由和监控指标，不向公网暴露。
    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .app_data(json_config())
                .wrap(Logger::default())
                .configure(admin_routes)
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    // 9. 并发运行服务器
    if let Some(internal) = internal_server {
        // 如果开启了内部服务器，使用 `try_join!` 同时等待两个服务器运行。
        // 任何一个出错都会导致整体退出。
        tokio::try_join!(public_server, internal)?;
    } else {
        // 否则只等待公共服务器。
        public_server.await?;
    }

    Ok(())
}

// 定义启动过程中的错误枚举。
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] rewards_domain::storage::StorageError),
    #[error("identity provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// 辅助函数：清理 Unix Socket 文件。
// 如果 socket 文件已存在（例如上次非正常退出遗留），bind 会失败，所以需要先删除。
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

// 非 Unix 系统的空实现。
#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}
