//! WebKitGTK render surfaces for OwL Browser tabs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use gtk::prelude::*;
use gtk::{gio, glib};
use tabs::{SurfaceProvider, TabId};
use util::IdGenerator;
use webkit6::prelude::*;

mod pages;

pub use pages::{render, render_uri};

/// Scheme of the pages rendered by the browser itself.
pub const OWL_SCHEME: &str = "owl";

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/605.1.15 \
(KHTML, like Gecko) Version/17.0 Safari/605.1.15";

const DARK_STYLE: &str = "html{filter:invert(1) hue-rotate(180deg);background:#fff}\
img,video,picture,canvas{filter:invert(1) hue-rotate(180deg)}";

const NOT_FOUND: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<title>Not found</title></head><body><h1>Page not found</h1></body></html>";

/// Things a surface reports back to whoever owns the tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A load finished.
    Navigated {
        tab: TabId,
        url: String,
        title: String,
    },
    /// A page asked for a new window. Open a tab with
    /// `TabInitializer::Deferred(token)` to show it.
    PopupRequested { token: u64 },
    /// The web process of a tab crashed or was killed.
    ProcessGone(TabId),
}

/// Serves `owl://` pages. Must be called once, before the first surface loads.
pub fn register_owl_scheme() {
    let Some(context) = webkit6::WebContext::default() else {
        log::error!("No default web context, {}:// pages unavailable", OWL_SCHEME);
        return;
    };

    context.register_uri_scheme(OWL_SCHEME, |request| {
        let uri = request.uri().map(|uri| uri.to_string()).unwrap_or_default();
        let html = render_uri(&uri).unwrap_or_else(|| {
            log::warn!("Unknown internal page '{}'", uri);
            NOT_FOUND.to_string()
        });
        let bytes = glib::Bytes::from_owned(html.into_bytes());
        let stream = gio::MemoryInputStream::from_bytes(&bytes);
        request.finish(&stream, bytes.len() as i64, Some("text/html"));
    });
}

/// Creates one `WebView` per thawed tab and hosts them in a `gtk::Stack`.
pub struct WebKitSurfaces {
    stack: gtk::Stack,
    listener: Rc<dyn Fn(SurfaceEvent)>,
    tokens: Rc<IdGenerator>,
    /// Popup addresses waiting for a tab, by token.
    pending: Rc<RefCell<HashMap<u64, String>>>,
}

impl WebKitSurfaces {
    pub fn new(stack: gtk::Stack, listener: impl Fn(SurfaceEvent) + 'static) -> Self {
        Self {
            stack,
            listener: Rc::new(listener),
            tokens: Rc::new(IdGenerator::default()),
            pending: Rc::default(),
        }
    }

    pub fn stack(&self) -> &gtk::Stack {
        &self.stack
    }

    /// Brings `surface` to the front of the stack.
    pub fn show(&self, surface: &webkit6::WebView) {
        self.stack.set_visible_child(surface);
        surface.grab_focus();
    }

    fn settings() -> webkit6::Settings {
        webkit6::Settings::builder()
            .enable_javascript(true)
            .enable_developer_extras(cfg!(debug_assertions))
            .build()
    }

    fn connect_signals(&self, tab: TabId, view: &webkit6::WebView) {
        let listener = Rc::clone(&self.listener);
        view.connect_load_changed(move |view, event| {
            if event != webkit6::LoadEvent::Finished {
                return;
            }
            let url = view.uri().map(|uri| uri.to_string()).unwrap_or_default();
            let title = view.title().map(|title| title.to_string()).unwrap_or_default();
            listener(SurfaceEvent::Navigated { tab, url, title });
        });

        let listener = Rc::clone(&self.listener);
        view.connect_web_process_terminated(move |_, reason| {
            log::warn!("Web process of tab {} terminated: {:?}", tab, reason);
            listener(SurfaceEvent::ProcessGone(tab));
        });

        let listener = Rc::clone(&self.listener);
        let tokens = Rc::clone(&self.tokens);
        let pending = Rc::clone(&self.pending);
        view.connect_decide_policy(move |_, decision, decision_type| {
            if decision_type != webkit6::PolicyDecisionType::NewWindowAction {
                return false;
            }
            let Some(policy) = decision.dynamic_cast_ref::<webkit6::NavigationPolicyDecision>()
            else {
                return false;
            };
            let Some(mut action) = policy.navigation_action() else {
                return false;
            };
            let Some(uri) = action.request().and_then(|request| request.uri()) else {
                return false;
            };

            decision.ignore();
            let token = tokens.next();
            log::debug!("Tab {} requested a window for '{}'", tab, uri);
            pending.borrow_mut().insert(token, uri.to_string());
            listener(SurfaceEvent::PopupRequested { token });
            true
        });
    }
}

impl SurfaceProvider for WebKitSurfaces {
    type Surface = webkit6::WebView;

    fn create(&self, tab: TabId) -> webkit6::WebView {
        let view = webkit6::WebView::builder()
            .settings(&Self::settings())
            .user_content_manager(&webkit6::UserContentManager::new())
            .build();
        view.set_hexpand(true);
        view.set_vexpand(true);

        self.connect_signals(tab, &view);
        self.stack.add_named(&view, Some(&tab.to_string()));
        view
    }

    fn load_url(&self, surface: &webkit6::WebView, url: &str) {
        surface.load_uri(url);
    }

    fn snapshot_state(&self, surface: &webkit6::WebView) -> Vec<u8> {
        surface
            .session_state()
            .serialize()
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }

    fn restore_state(&self, surface: &webkit6::WebView, state: &[u8]) -> bool {
        let session = webkit6::WebViewSessionState::new(&glib::Bytes::from(state));
        surface.restore_session_state(&session);

        // Restoring only fills the history; the current entry still has to be loaded.
        match surface
            .back_forward_list()
            .and_then(|list| list.current_item())
        {
            Some(item) => {
                surface.go_to_back_forward_list_item(&item);
                true
            }
            None => false,
        }
    }

    fn attach_deferred(&self, surface: &webkit6::WebView, token: u64) {
        match self.pending.borrow_mut().remove(&token) {
            Some(uri) => surface.load_uri(&uri),
            None => log::warn!("No pending window for token {}", token),
        }
    }

    fn destroy(&self, surface: webkit6::WebView) {
        surface.stop_loading();
        self.stack.remove(&surface);
    }

    fn set_desktop_mode(&self, surface: &webkit6::WebView, enabled: bool) {
        let Some(settings) = WebViewExt::settings(surface) else {
            return;
        };
        let user_agent = enabled.then_some(DESKTOP_USER_AGENT);
        if settings.user_agent().as_deref() == user_agent {
            return;
        }
        settings.set_user_agent(user_agent);
        if surface.uri().is_some() {
            surface.reload();
        }
    }

    fn set_dark_mode(&self, surface: &webkit6::WebView, enabled: bool) {
        let Some(manager) = surface.user_content_manager() else {
            return;
        };
        manager.remove_all_style_sheets();
        if enabled {
            let sheet = webkit6::UserStyleSheet::new(
                DARK_STYLE,
                webkit6::UserContentInjectedFrames::AllFrames,
                webkit6::UserStyleLevel::User,
                &[],
                &[],
            );
            manager.add_style_sheet(&sheet);
        }
    }

    fn find_in_page(&self, surface: &webkit6::WebView, query: Option<&str>) {
        let Some(controller) = surface.find_controller() else {
            return;
        };
        match query.filter(|query| !query.is_empty()) {
            Some(query) => {
                let options =
                    webkit6::FindOptions::CASE_INSENSITIVE | webkit6::FindOptions::WRAP_AROUND;
                controller.search(query, options.bits(), u32::MAX);
            }
            None => controller.search_finish(),
        }
    }
}
