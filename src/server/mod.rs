//! The backend service: nearest-stop lookups, heatmap runs and the two
//! static files the page reads.

pub mod nearest;
pub mod script;

use std::path::PathBuf;

use actix_web::{
    http::{header, Method},
    middleware::DefaultHeaders,
    web, App, HttpResponse, HttpServer,
};
use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    api::{NearestStop, SearchRequest},
    catalog::{Catalog, CATALOG_FILE},
    server::script::{departure_time, locate_script, ScriptInvocation},
    session::{LatLng, HEATMAP_PATH},
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Holds the stop catalog and receives the generated heatmap.
    pub public_dir: PathBuf,
    /// Scripts a search may name.
    pub script_dir: PathBuf,
    pub interpreter: String,
}

impl ServerConfig {
    fn heatmap_file(&self) -> PathBuf {
        self.public_dir.join(HEATMAP_PATH.trim_start_matches('/'))
    }
}

pub struct AppState {
    pub catalog: Catalog,
    pub config: ServerConfig,
}

impl AppState {
    /// Loads the catalog from the public directory. A missing or broken
    /// catalog leaves the service running with no stops.
    pub fn load(config: ServerConfig) -> Self {
        let catalog = Catalog::read(config.public_dir.join(CATALOG_FILE)).unwrap_or_else(|err| {
            warn!("{err:#}");
            Catalog::default()
        });
        info!(stops = catalog.len(), "Loaded stops for nearest-stop lookups");

        Self { catalog, config }
    }
}

fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new().add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
}

async fn preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .finish()
}

async fn nearest_stop(state: web::Data<AppState>, body: web::Json<LatLng>) -> HttpResponse {
    let at = body.into_inner();

    match nearest::find_nearest_stop(at, state.catalog.stops()) {
        Some(stop) => HttpResponse::Ok().json(NearestStop::from(stop)),
        None => HttpResponse::NotFound().json(json!({ "error": "No stops loaded" })),
    }
}

async fn run_script(state: web::Data<AppState>, body: web::Json<SearchRequest>) -> HttpResponse {
    let request = body.into_inner();
    info!(?request, "Search requested");

    let Some(script) = locate_script(&state.config.script_dir, &request.script_name) else {
        return HttpResponse::NotFound().json(json!({ "error": "Script not found" }));
    };

    let time = match departure_time(&request.date_time) {
        Ok(time) => time,
        Err(err) => return HttpResponse::BadRequest().json(json!({ "error": format!("{err:#}") })),
    };

    let invocation = ScriptInvocation {
        interpreter: state.config.interpreter.clone(),
        script,
        stop: request.start_stop.id,
        time,
        output: state.config.heatmap_file(),
    };

    match web::block(move || invocation.run()).await {
        Ok(Ok(())) => HttpResponse::Ok().json("OK"),
        Ok(Err(err)) => {
            warn!("Heatmap script failed: {err:#}");
            HttpResponse::InternalServerError().json(json!({ "error": format!("{err:#}") }))
        }
        Err(err) => {
            warn!("Heatmap script did not finish: {err}");
            HttpResponse::InternalServerError().json(json!({ "error": err.to_string() }))
        }
    }
}

async fn public_file(state: web::Data<AppState>, file: web::Path<String>) -> HttpResponse {
    let name = file.into_inner();
    let content_type = match name.as_str() {
        CATALOG_FILE => "text/csv; charset=utf-8",
        n if format!("/{n}") == HEATMAP_PATH => "image/svg+xml",
        _ => return HttpResponse::NotFound().finish(),
    };

    let path = state.config.public_dir.join(&name);
    match web::block(move || std::fs::read(path)).await {
        Ok(Ok(bytes)) => HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, content_type))
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .body(bytes),
        Ok(Err(err)) => {
            warn!("Failed to read {name}: {err}");
            HttpResponse::NotFound().finish()
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/get-nearest-stop")
            .route(web::post().to(nearest_stop))
            .route(web::method(Method::OPTIONS).to(preflight)),
    )
    .service(
        web::resource("/run-script")
            .route(web::post().to(run_script))
            .route(web::method(Method::OPTIONS).to(preflight)),
    )
    .service(
        web::resource("/{file}")
            .route(web::get().to(public_file))
            .route(web::method(Method::OPTIONS).to(preflight)),
    );
}

pub async fn serve(config: ServerConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let state = web::Data::new(AppState::load(config));

    info!("Server running on {bind}:{port}");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_headers())
            .configure(routes)
    })
    .bind((bind, port))
    .with_context(|| format!("Failed to bind {bind}:{port}"))?
    .run()
    .await
    .context("Server stopped unexpectedly")
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use actix_web::{http::StatusCode, test};

    use super::*;
    use crate::{
        api::SCRIPT_NAME,
        catalog::stop::{StopId, StopRecord},
        session::SelectedStop,
    };

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("heatmap-planner-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn state(public_dir: &Path, script_dir: &Path, interpreter: &str) -> web::Data<AppState> {
        web::Data::new(AppState {
            catalog: Catalog::new(vec![
                StopRecord::new(
                    StopId::new("1"),
                    "Far".to_owned(),
                    54.52,
                    18.53,
                    "bus".to_owned(),
                ),
                StopRecord::new(
                    StopId::new("7"),
                    "Test Stop".to_owned(),
                    54.36,
                    18.65,
                    "tram".to_owned(),
                ),
            ]),
            config: ServerConfig {
                public_dir: public_dir.to_owned(),
                script_dir: script_dir.to_owned(),
                interpreter: interpreter.to_owned(),
            },
        })
    }

    fn search_body() -> SearchRequest {
        SearchRequest {
            script_name: SCRIPT_NAME.to_owned(),
            start_stop: SelectedStop::new(StopId::new("7"), "Test Stop".to_owned(), 54.36, 18.65),
            date_time: "2024-05-01T08:30:00.000Z".to_owned(),
        }
    }

    #[actix_web::test]
    async fn nearest_stop_answers_with_lng() {
        let dir = scratch_dir("nearest");
        let app = test::init_service(
            App::new()
                .app_data(state(&dir, &dir, "true"))
                .wrap(cors_headers())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/get-nearest-stop")
            .set_json(LatLng::new(54.35, 18.64))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({"id": "7", "name": "Test Stop", "lat": 54.36, "lng": 18.65})
        );
    }

    #[actix_web::test]
    async fn nearest_stop_without_catalog_is_not_found() {
        let dir = scratch_dir("empty");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    catalog: Catalog::default(),
                    config: state(&dir, &dir, "true").config.clone(),
                }))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/get-nearest-stop")
            .set_json(LatLng::new(54.35, 18.64))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn preflight_allows_json_posts() {
        let dir = scratch_dir("preflight");
        let app = test::init_service(
            App::new()
                .app_data(state(&dir, &dir, "true"))
                .wrap(cors_headers())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/run-script")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Content-Type"
        );
    }

    #[actix_web::test]
    async fn missing_script_is_not_found() {
        let dir = scratch_dir("missing-script");
        let app = test::init_service(
            App::new()
                .app_data(state(&dir, &dir.join("nowhere"), "true"))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/run-script")
            .set_json(search_body())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "Script not found"}));
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn run_script_reports_exit_status() {
        let dir = scratch_dir("run-script");
        fs::write(dir.join(SCRIPT_NAME), "").unwrap();

        for (interpreter, expected) in [
            ("true", StatusCode::OK),
            ("false", StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            let app = test::init_service(
                App::new()
                    .app_data(state(&dir, &dir, interpreter))
                    .configure(routes),
            )
            .await;

            let req = test::TestRequest::post()
                .uri("/run-script")
                .set_json(search_body())
                .to_request();
            let resp = test::call_service(&app, req).await;

            assert_eq!(resp.status(), expected, "interpreter {interpreter}");
        }
    }

    #[actix_web::test]
    async fn serves_only_known_public_files() {
        let dir = scratch_dir("public");
        fs::write(dir.join(CATALOG_FILE), "name,code,lat,lon,type\n").unwrap();
        fs::write(dir.join("secret.txt"), "nope").unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state(&dir, &dir, "true"))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/unified_stops.csv?timestamp=1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"name,code,lat,lon,type\n");

        let req = test::TestRequest::get().uri("/secret.txt").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
