#[macro_use]
extern crate rocket;

pub mod cleaning;
mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod models;
pub mod registry;
pub mod request_logger;
pub mod routes;
pub mod store;

use crate::cleaning::{CleaningConfig, CleaningService, HttpCleaningClient};
use crate::engine::{BatchEngine, EngineConfig};
use crate::registry::RunRegistry;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

/// Install the `env_logger` backend once per process. `default_filter` applies when
/// `RUST_LOG` is unset.
pub fn init_logger(default_filter: &str) {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger("info,rocket::server=warn,rocket::request=warn");

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(cors)
        .manage(RunRegistry::from_env())
        .attach(AdHoc::try_on_ignite(
            "Cleaning Service",
            |rocket| async move {
                let cleaning_config = CleaningConfig::from_env();
                let engine_config = EngineConfig::from_env();

                let client = match HttpCleaningClient::new(&cleaning_config) {
                    Ok(client) => client,
                    Err(err) => {
                        log::error!("failed to initialize cleaning client: {}", err);
                        return Err(rocket);
                    }
                };

                if let Err(err) = client.healthcheck().await {
                    log::warn!(
                        "cleaning service health check failed: {}. Runs will fall back to per-row calls until it recovers.",
                        err
                    );
                }

                log::info!(
                    "cleaning service at {} (batch size {}, up to {} workers, call timeout {:?})",
                    cleaning_config.base_url,
                    engine_config.batch_size(),
                    engine_config.max_concurrency(),
                    engine_config.call_timeout()
                );

                let service: Arc<dyn CleaningService> = Arc::new(client);
                let engine = BatchEngine::new(service, engine_config);

                Ok(rocket.manage(engine))
            },
        ))
        .attach(AdHoc::on_shutdown("Cancel Runs", |rocket| {
            Box::pin(async move {
                if let Some(registry) = rocket.state::<RunRegistry>() {
                    log::info!("shutting down, cancelling {} active runs", registry.running());
                    registry.shutdown();
                }
            })
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Health routes
                routes::health::health_check,
                // Run routes
                routes::runs::start_run,
                routes::runs::list_runs,
                routes::runs::get_run,
                routes::runs::cancel_run,
                routes::runs::delete_run,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Geobatch API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::cleaning::CleaningService;
    use crate::engine::{BatchEngine, EngineConfig};
    use crate::registry::RunRegistry;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use std::sync::Arc;

    /// Builder for constructing Rocket instances tailored for integration tests.
    ///
    /// A fresh [`RunRegistry`] is always managed so run routes can be mounted without
    /// further setup.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        engine: Option<BatchEngine>,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                engine: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        /// Manage an engine backed by `service` for tests that start runs.
        pub fn manage_service(self, service: Arc<dyn CleaningService>, config: EngineConfig) -> Self {
            self.manage_engine(BatchEngine::new(service, config))
        }

        pub fn manage_engine(mut self, engine: BatchEngine) -> Self {
            self.engine = Some(engine);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).manage(RunRegistry::new());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(engine) = self.engine {
                rocket = rocket.manage(engine);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
