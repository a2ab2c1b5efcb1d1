mod api;
mod app;
mod controller;
mod form;
mod launch;
mod notifier;
mod presentation;
mod preview;
mod protocol;
mod shelf;
mod tones;

use std::sync::Arc;

use api::{HttpJobApi, JobApi};

fn main() -> eframe::Result<()> {
    env_logger::init();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let env_server = std::env::var(launch::SERVER_ENV_VAR).ok();
    let (config, mut initial_status) =
        match launch::parse_client_config_from_args(&cli_args, env_server) {
            Ok(config) => (config, None),
            Err(err) => {
                log::warn!("Falling back to default settings: {err}");
                (
                    launch::ClientConfig::default(),
                    Some(format!("Launch args error: {err}")),
                )
            }
        };

    let api = match HttpJobApi::new(&config.server_url) {
        Ok(api) => api,
        Err(err) => {
            log::error!("{err:#}");
            initial_status = Some(format!("Server setup error: {err:#}"));
            match HttpJobApi::new(launch::DEFAULT_SERVER_URL) {
                Ok(api) => api,
                Err(err) => {
                    log::error!("Default server is unusable too: {err:#}");
                    return Err(eframe::Error::AppCreation(err.into()));
                }
            }
        }
    };
    let api: Arc<dyn JobApi> = Arc::new(api);
    let strategy = notifier::strategy_for(&config, Arc::clone(&api));
    log::info!(
        "Using {} with {:?} progress notifications",
        config.server_url,
        config.notifier
    );

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 860.0])
            .with_decorations(false)
            .with_resizable(true)
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Sunfire Studio",
        native_options,
        Box::new(move |_cc| {
            let controller = controller::VideoFormController::new(config, api, strategy);
            Ok(Box::new(app::SunfireApp::new(controller, initial_status)))
        }),
    )
}
