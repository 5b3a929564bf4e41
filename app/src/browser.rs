use std::cell::RefCell;
use std::rc::{Rc, Weak};

use adw::prelude::*;
use engine::{SurfaceEvent, WebKitSurfaces};
use gtk::{gio, glib};
use storage::SessionStore;
use tabs::{
    uris, Notice, SpecialPage, SurfaceProvider, TabEvent, TabInitializer, TabManager, TabsConfig,
};

const APP_TITLE: &str = "OwL Browser";

type Manager = TabManager<WebKitSurfaces>;

/// The browser window and the tabs it shows.
pub struct Browser {
    manager: RefCell<Manager>,
    events: Rc<RefCell<Vec<TabEvent>>>,
    window: adw::ApplicationWindow,
    title: adw::WindowTitle,
    address: gtk::Entry,
    toasts: adw::ToastOverlay,
}

impl Browser {
    pub fn new(
        app: &adw::Application,
        store: Rc<RefCell<SessionStore>>,
        config: TabsConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Browser>| {
            let stack = gtk::Stack::new();
            stack.set_hexpand(true);
            stack.set_vexpand(true);

            // Engine signals can fire while the manager is busy, so they are
            // handled once the main loop is idle again.
            let weak_for_surfaces = weak.clone();
            let surfaces = WebKitSurfaces::new(stack.clone(), move |event| {
                let weak = weak_for_surfaces.clone();
                glib::idle_add_local_once(move || {
                    if let Some(browser) = weak.upgrade() {
                        browser.on_surface_event(event);
                    }
                });
            });

            let events: Rc<RefCell<Vec<TabEvent>>> = Rc::default();
            let sink_events = Rc::clone(&events);
            let manager = TabManager::new(surfaces, store, config, move |event: TabEvent| {
                sink_events.borrow_mut().push(event)
            });

            let title = adw::WindowTitle::new(APP_TITLE, "");
            let address = gtk::Entry::builder()
                .placeholder_text("Search or enter address")
                .hexpand(true)
                .build();

            let header = build_header_bar(&title);
            let toolbar = gtk::Box::new(gtk::Orientation::Horizontal, 6);
            toolbar.set_margin_start(6);
            toolbar.set_margin_end(6);
            toolbar.set_margin_bottom(6);
            toolbar.append(&address);

            let content = gtk::Box::new(gtk::Orientation::Vertical, 0);
            content.append(&header);
            content.append(&toolbar);
            content.append(&stack);

            let toasts = adw::ToastOverlay::new();
            toasts.set_child(Some(&content));

            let window = adw::ApplicationWindow::builder()
                .application(app)
                .title(APP_TITLE)
                .default_width(1280)
                .default_height(800)
                .content(&toasts)
                .build();

            Browser {
                manager: RefCell::new(manager),
                events,
                window,
                title,
                address,
                toasts,
            }
        })
    }

    /// Restores the tabs, then opens `urls` on top of them.
    pub fn start(self: &Rc<Self>, incognito: bool, urls: Vec<String>) {
        self.install_actions();
        self.connect_window();

        self.with_manager(|manager| {
            for url in urls {
                manager.open_external_url(url);
            }
            manager.initialize(incognito);
        });
        self.window.present();
    }

    /// Runs `action` on the tab manager, then reacts to what it emitted.
    fn with_manager<T>(&self, action: impl FnOnce(&mut Manager) -> T) -> T {
        let result = action(&mut self.manager.borrow_mut());
        self.drain_events();
        result
    }

    fn drain_events(&self) {
        let events = std::mem::take(&mut *self.events.borrow_mut());
        let mut show_current = false;

        for event in events {
            log::debug!("Tab event {:?}", event);
            match event {
                TabEvent::Initialized | TabEvent::TabChanged(_) => show_current = true,
                TabEvent::TabCountChanged(count) => {
                    self.title.set_subtitle(&tab_count_label(count));
                }
                TabEvent::CloseBrowser => self.window.close(),
                TabEvent::ReturnToCaller => self.window.minimize(),
                TabEvent::MaxTabsReached(limit) => {
                    self.toast(&format!("More than {limit} tabs are open"));
                }
                TabEvent::Notice(notice) => self.toast(&notice_text(&notice)),
                TabEvent::TabAdded(_) | TabEvent::TabRemoved(_) => {}
            }
        }

        if show_current {
            self.show_current();
        }
    }

    fn show_current(&self) {
        let manager = self.manager.borrow();
        let Some(tab) = manager.current_tab() else {
            return;
        };
        if let Some(surface) = tab.surface() {
            manager.provider().show(surface);
        }

        let heading = if tab.title().is_empty() {
            APP_TITLE
        } else {
            tab.title()
        };
        self.title.set_title(heading);
        self.window.set_title(Some(heading));
        if !self.address.has_focus() {
            let shown = if uris::is_special_url(tab.url()) { "" } else { tab.url() };
            self.address.set_text(shown);
        }
    }

    fn toast(&self, text: &str) {
        self.toasts.add_toast(adw::Toast::new(text));
    }

    fn on_surface_event(&self, event: SurfaceEvent) {
        self.with_manager(|manager| match event {
            SurfaceEvent::Navigated { tab, url, title } => {
                manager.update_navigation(tab, &url, &title);
            }
            SurfaceEvent::PopupRequested { token } => {
                manager.open_tab(TabInitializer::Deferred(token), true);
            }
            SurfaceEvent::ProcessGone(tab) => {
                manager.on_render_process_gone(tab);
            }
        });
    }

    /// Loads what was typed into the address bar in the current tab.
    fn navigate(&self, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            return;
        }
        let manager = self.manager.borrow();
        let url = normalize_input(input, &manager.config().search_url);
        match manager.current_tab().and_then(|tab| tab.surface()) {
            Some(surface) => {
                manager.provider().load_url(surface, &url);
                surface.grab_focus();
            }
            None => log::warn!("No tab to load '{}' into", url),
        }
    }

    fn install_actions(self: &Rc<Self>) {
        let app = self.window.application();
        let actions: [(&str, &[&str], fn(&Browser)); 5] = [
            ("new-tab", &["<Ctrl>t"], |browser| {
                browser.with_manager(|manager| {
                    manager.open_tab(TabInitializer::Page(SpecialPage::Home), true);
                });
            }),
            ("close-tab", &["<Ctrl>w"], |browser| {
                browser.with_manager(|manager| {
                    if let Some(index) = manager.current_index() {
                        manager.delete_tab(index);
                    }
                });
            }),
            ("reopen-tab", &["<Ctrl><Shift>t"], |browser| {
                browser.with_manager(|manager| {
                    manager.recover_closed_tab(true);
                });
            }),
            ("previous-tab", &["<Ctrl>Tab"], |browser| {
                browser.with_manager(|manager| {
                    let previous = manager
                        .recent_tabs()
                        .nth(1)
                        .and_then(|id| manager.position(id));
                    if let Some(index) = previous {
                        manager.switch_to_tab(index);
                    }
                });
            }),
            ("close-other-tabs", &[], |browser| {
                browser.with_manager(Manager::close_all_other_tabs);
            }),
        ];

        for (name, accels, handler) in actions {
            let action = gio::SimpleAction::new(name, None);
            let weak = Rc::downgrade(self);
            action.connect_activate(move |_, _| {
                if let Some(browser) = weak.upgrade() {
                    handler(&browser);
                }
            });
            self.window.add_action(&action);
            if let Some(app) = &app {
                app.set_accels_for_action(&format!("win.{name}"), accels);
            }
        }
    }

    fn connect_window(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.address.connect_activate(move |entry| {
            if let Some(browser) = weak.upgrade() {
                browser.navigate(&entry.text());
            }
        });

        let weak = Rc::downgrade(self);
        self.window.connect_notify_local(Some("is-active"), move |window, _| {
            if window.is_active() {
                return;
            }
            if let Some(browser) = weak.upgrade() {
                browser.with_manager(Manager::on_background);
            }
        });

        // The window keeps the browser alive until it is closed.
        let owner = RefCell::new(Some(Rc::clone(self)));
        self.window.connect_close_request(move |_| {
            if let Some(browser) = owner.borrow_mut().take() {
                browser.shutdown();
            }
            glib::Propagation::Proceed
        });
    }

    fn shutdown(&self) {
        let mut manager = self.manager.borrow_mut();
        manager.save_state();
        if let Err(err) = manager.store().borrow().flush() {
            log::error!("Failed to write pending state: {}", err);
        }
        manager.shutdown();
    }
}

fn build_header_bar(title: &adw::WindowTitle) -> adw::HeaderBar {
    let header = adw::HeaderBar::new();
    header.set_show_start_title_buttons(true);
    header.set_show_end_title_buttons(true);
    header.set_title_widget(Some(title));

    let buttons = [
        ("tab-new-symbolic", "New Tab", "win.new-tab"),
        ("window-close-symbolic", "Close Tab", "win.close-tab"),
        ("edit-undo-symbolic", "Reopen Closed Tab", "win.reopen-tab"),
    ];
    for (icon, tooltip, action) in buttons {
        let button = gtk::Button::builder()
            .icon_name(icon)
            .tooltip_text(tooltip)
            .action_name(action)
            .build();
        header.pack_start(&button);
    }
    header
}

fn tab_count_label(count: usize) -> String {
    match count {
        1 => "1 tab".to_string(),
        count => format!("{count} tabs"),
    }
}

fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::TabsSalvaged { session, count } => {
            format!("Session \u{201c}{session}\u{201d} was damaged, {count} tabs were recovered")
        }
        Notice::SessionFallback { damaged, loaded } => {
            format!("Session \u{201c}{damaged}\u{201d} was damaged, opened \u{201c}{loaded}\u{201d}")
        }
        Notice::RecoverySessionCreated(name) => {
            format!("Saved tabs could not be restored, started \u{201c}{name}\u{201d}")
        }
        Notice::ReopeningClosedTab => "Reopening closed tab".to_string(),
    }
}

/// Turns address bar input into a URL, searching for anything that is not one.
fn normalize_input(input: &str, search_template: &str) -> String {
    if storage::recovery::is_recoverable_url(input) || uris::is_special_url(input) {
        return input.to_string();
    }
    if !input.contains(char::is_whitespace) && input.contains('.') {
        return format!("https://{input}");
    }
    uris::search_url(search_template, input)
}
