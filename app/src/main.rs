use std::cell::RefCell;
use std::rc::Rc;

use adw::prelude::*;
use clap::Parser;
use gtk::glib;
use storage::SessionStore;

mod browser;
mod config;

use browser::Browser;
use config::AppConfig;

const APP_ID: &str = "com.owl.browser";

/// OwL Browser - a light tabbed web browser
#[derive(Debug, Default, Parser)]
#[command(name = "owl-browser")]
#[command(author, version, about, long_about = None)]
struct Launch {
    /// Start a private window whose tabs are never saved
    #[arg(short, long)]
    incognito: bool,

    /// Addresses to open in new tabs
    #[arg(value_name = "URL")]
    urls: Vec<String>,
}

fn main() -> glib::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let launch = Rc::new(RefCell::new(Launch::parse()));
    // Options are handled here, so the toolkit only sees the program name.
    let program = std::env::args().next().unwrap_or_else(|| "owl-browser".to_string());
    let config = AppConfig::load();
    log::info!("Storing state in {:?}", config.storage.dir);

    let app = adw::Application::builder().application_id(APP_ID).build();
    app.connect_startup(|_| engine::register_owl_scheme());
    app.connect_activate(move |app| {
        let launch = std::mem::take(&mut *launch.borrow_mut());
        build_ui(app, &config, launch);
    });
    app.run_with_args(&[program])
}

fn build_ui(app: &adw::Application, config: &AppConfig, launch: Launch) {
    if let Some(window) = app.active_window() {
        window.present();
        return;
    }

    let style_manager = adw::StyleManager::default();
    style_manager.set_color_scheme(adw::ColorScheme::Default);

    let store = match SessionStore::open(&config.storage) {
        Ok(store) => Rc::new(RefCell::new(store)),
        Err(err) => {
            log::error!("Failed to open session storage: {}", err);
            app.quit();
            return;
        }
    };

    let browser = Browser::new(app, store, config.tabs.clone());
    browser.start(launch.incognito, launch.urls);
}
