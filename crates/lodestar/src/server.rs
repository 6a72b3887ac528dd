use crate::{
    app_state::AppState,
    config::ServeConfig,
    error::{self, json_error_handler, multipart_error_handler},
    handlers,
    media::{CloudinaryMedia, CloudinarySettings, CLOUDINARY_API_BASE},
    store::SeaOrmAccountStore,
};
use actix_cors::Cors;
use actix_multipart::form::{tempfile::TempFileConfig, MultipartFormConfig};
use actix_web::{http::header, middleware, web, App, HttpServer};
use lodestar_core::password::Argon2Credentials;
use lodestar_core::token::{TokenIssuer, TokenSettings};
use migration::MigratorTrait;
use sea_orm::Database;
use std::path::PathBuf;
use std::sync::Arc;

/// Where multipart file parts are buffered and how large a request may be.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl From<&ServeConfig> for UploadSettings {
    fn from(config: &ServeConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub async fn run_server(config: ServeConfig) -> anyhow::Result<()> {
    log::info!("Starting Lodestar Account Server...");

    // 1. Local staging directory for uploads
    let uploads = UploadSettings::from(&config);
    tokio::fs::create_dir_all(&uploads.upload_dir).await?;
    log::info!("Buffering uploads in {:?}", uploads.upload_dir);

    // 2. Database, media store, credentials and tokens
    let app_state = build_app_state(&config).await?;

    // 3. Start HTTP server
    let bind_address = config.bind_address.clone();
    let cors_origins = config.cors_origin_list();

    log::info!("Listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(build_cors(&cors_origins))
            .configure(|cfg| configure_api(cfg, app_state.clone(), &uploads))
            .default_service(web::to(error::not_found))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

pub async fn build_app_state(config: &ServeConfig) -> anyhow::Result<web::Data<AppState>> {
    log::info!("Connecting to database: {}", config.database_url);
    let db = Database::connect(&config.database_url).await?;

    log::info!("Running database migrations...");
    migration::Migrator::up(&db, None).await?;
    log::info!("Database migrations completed");

    let media = CloudinaryMedia::new(CloudinarySettings {
        cloud_name: config.cloudinary_cloud_name.clone(),
        api_key: config.cloudinary_api_key.clone(),
        api_secret: config.cloudinary_api_secret.clone(),
        folder: config.cloudinary_folder.clone(),
        api_base: CLOUDINARY_API_BASE.to_string(),
    })?;
    log::info!("Media uploads go to Cloudinary cloud: {}", config.cloudinary_cloud_name);

    let tokens = TokenIssuer::new(&TokenSettings {
        issuer: config.base_url.clone(),
        access_secret: config.access_token_secret.clone(),
        access_ttl: config.access_token_expiry,
        refresh_secret: config.refresh_token_secret.clone(),
        refresh_ttl: config.refresh_token_expiry,
    });

    Ok(web::Data::new(AppState {
        accounts: Arc::new(SeaOrmAccountStore::new(db)),
        media: Arc::new(media),
        credentials: Arc::new(Argon2Credentials::default()),
        tokens,
    }))
}

/// Registers shared state, extractor configuration and the account routes.
pub fn configure_api(
    cfg: &mut web::ServiceConfig,
    app_state: web::Data<AppState>,
    uploads: &UploadSettings,
) {
    cfg.app_data(app_state)
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(
            MultipartFormConfig::default()
                .total_limit(uploads.max_upload_bytes)
                .error_handler(multipart_error_handler),
        )
        .app_data(TempFileConfig::default().directory(&uploads.upload_dir))
        .service(account_routes());
}

fn account_routes() -> actix_web::Scope {
    web::scope("/api/v1/users")
        .route("/register", web::post().to(handlers::register))
        .route("/login", web::post().to(handlers::login))
        .route("/logout", web::post().to(handlers::logout))
        .route("/refresh-token", web::post().to(handlers::refresh_token))
        .route(
            "/change-password",
            web::post().to(handlers::account::change_password),
        )
        .route(
            "/current-user",
            web::get().to(handlers::account::current_account),
        )
        .route(
            "/update-account",
            web::patch().to(handlers::account::update_account_details),
        )
        .route("/avatar", web::patch().to(handlers::account::update_avatar))
        .route(
            "/cover-image",
            web::patch().to(handlers::account::update_cover_image),
        )
}

/// Cookies carry the session, so credentials must be allowed for the listed origins.
fn build_cors(origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PATCH", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .supports_credentials()
        .max_age(3600);

    for origin in origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let app = test::init_service(
            App::new()
                .wrap(build_cors(&["http://localhost:5173".to_string()]))
                .default_service(web::to(error::not_found)),
        )
        .await;

        let req = test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/api/v1/users/avatar")
            .insert_header((header::ORIGIN, "http://localhost:5173"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:5173")
        );
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }

    #[actix_web::test]
    async fn test_unknown_route_returns_error_envelope() {
        let app =
            test::init_service(App::new().default_service(web::to(error::not_found))).await;

        let req = test::TestRequest::get().uri("/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["success"], false);
    }
}
