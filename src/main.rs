//! Potion Dropper
//!
//! A Windows system tray application that plays the potion-brewing puzzle:
//! Ctrl+Shift+A starts dropping pairs, Ctrl+Shift+Q or Esc stops.

// Hide console window on Windows
#![cfg_attr(windows, windows_subsystem = "windows")]

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    tray::run()
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    potion_dropper::log("Potion Dropper only runs on Windows");
    Err(anyhow::anyhow!("unsupported platform"))
}

#[cfg(windows)]
mod tray {
    use anyhow::{anyhow, Context, Result};
    use std::path::Path;
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, OnceLock};
    use std::thread;

    use potion_dropper::automation::{ConfigStore, Engine, EngineEvent, EventKind, Fallback};
    use potion_dropper::capture::TitleMatch;
    use potion_dropper::recognition::Recognizers;
    use potion_dropper::{log, paths, platform};

    use windows::core::w;
    use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, POINT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT,
    };
    use windows::Win32::UI::Shell::{
        Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_MODIFY,
        NOTIFYICONDATAW,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        AppendMenuW, CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyMenu,
        DestroyWindow, DispatchMessageW, GetCursorPos, GetMessageW, LoadIconW, PostQuitMessage,
        RegisterClassW, SetForegroundWindow, TrackPopupMenu, TranslateMessage, CS_HREDRAW,
        CS_VREDRAW, CW_USEDEFAULT, IDI_APPLICATION, MF_SEPARATOR, MF_STRING, MSG,
        TPM_BOTTOMALIGN, TPM_LEFTALIGN, TPM_RIGHTBUTTON, WM_COMMAND, WM_DESTROY, WM_HOTKEY,
        WM_RBUTTONUP, WM_USER, WNDCLASSW, WS_OVERLAPPEDWINDOW,
    };

    const HOTKEY_START: i32 = 1;
    const HOTKEY_STOP: i32 = 2;
    const WM_TRAYICON: u32 = WM_USER + 1;

    // Menu item IDs
    const MENU_START: usize = 1001;
    const MENU_STOP: usize = 1002;
    const MENU_RELOAD_DELAYS: usize = 1003;
    const MENU_SAVE_DELAYS: usize = 1004;
    const MENU_RESET_DELAYS: usize = 1005;
    const MENU_EXIT: usize = 1006;

    const IDLE_TIP: &str = "Potion Dropper (Ctrl+Shift+A to start)";

    static ENGINE: OnceLock<Engine> = OnceLock::new();

    pub fn run() -> Result<()> {
        install_panic_hook();

        // Capture and cursor coordinates must be physical pixels.
        if let Err(e) =
            unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) }
        {
            log(&format!("Warning: could not enable per-monitor DPI awareness: {}", e));
        }

        paths::ensure_directories().context("Failed to create output directories")?;

        let engine = build_engine()?;
        let events = engine.events();
        ENGINE
            .set(engine)
            .map_err(|_| anyhow!("Engine already initialised"))?;

        run_tray_app(events)
    }

    fn engine() -> Option<&'static Engine> {
        ENGINE.get()
    }

    fn build_engine() -> Result<Engine> {
        let delays_path = paths::get_delays_path();
        let config = ConfigStore::open(&delays_path, Fallback::UseDefaults)?;
        if !delays_path.exists() {
            // Leave an editable copy of the defaults behind.
            if let Err(e) = config.save_config(&delays_path) {
                log(&format!("Warning: {}", e));
            }
        }

        let recognizers = Recognizers::load(
            &paths::get_layout_path(),
            &paths::get_swatch_manifest_path(),
            &paths::get_swatch_dir(),
        )
        .context("Failed to load layout and swatches")?;
        log(&format!(
            "Loaded layout ({}x{} board) and swatches",
            recognizers.layout.board.rows, recognizers.layout.board.columns
        ));

        let desktop = platform::create_desktop()?;
        Ok(Engine::new(
            desktop,
            Arc::new(recognizers),
            Arc::new(config),
            TitleMatch::default(),
        ))
    }

    fn install_panic_hook() {
        std::panic::set_hook(Box::new(|panic_info| {
            let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            let location = panic_info
                .location()
                .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
                .unwrap_or_default();
            log(&format!("[PANIC]{} {}", location, msg));
        }));
    }

    /// Runs the main system tray application with hotkey handling.
    fn run_tray_app(events: Option<Receiver<EngineEvent>>) -> Result<()> {
        let hwnd = create_message_window()?;
        add_tray_icon(hwnd)?;

        unsafe {
            RegisterHotKey(
                hwnd,
                HOTKEY_START,
                MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
                0x41, // 'A' key
            )?;
            RegisterHotKey(
                hwnd,
                HOTKEY_STOP,
                MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
                0x51, // 'Q' key
            )?;
        }

        if let Some(events) = events {
            spawn_event_listener(hwnd, events);
        }

        log("Potion Dropper started");
        log("Hotkey: Ctrl+Shift+A (start dropping)");
        log("Hotkey: Ctrl+Shift+Q or Esc (stop)");
        log("Right-click tray icon for delay settings and exit");

        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            let _ = UnregisterHotKey(hwnd, HOTKEY_START);
            let _ = UnregisterHotKey(hwnd, HOTKEY_STOP);
            remove_tray_icon(hwnd);
            let _ = DestroyWindow(hwnd);
        }

        if let Some(engine) = engine() {
            engine.stop();
            engine.wait();
        }
        log("Potion Dropper exited");
        Ok(())
    }

    /// Mirrors engine progress into the tray tooltip.
    fn spawn_event_listener(hwnd: HWND, events: Receiver<EngineEvent>) {
        // HWND is a pointer wrapper; window handles are valid across threads.
        let hwnd_raw = hwnd.0 as usize;
        thread::spawn(move || {
            let hwnd = HWND(hwnd_raw as *mut std::ffi::c_void);
            for event in events {
                let tip = match &event.kind {
                    EventKind::StateChanged(state) => {
                        format!("Potion Dropper: {} (run {})", state, event.run)
                    }
                    EventKind::CycleFinished(_) => continue,
                    EventKind::RunFinished(result) => {
                        log(&format!("Run {} ended: {}", event.run, result));
                        format!("Potion Dropper: {}. {}", result, IDLE_TIP)
                    }
                };
                set_tray_tip(hwnd, &tip);
            }
        });
    }

    fn start_dropping() {
        let Some(engine) = engine() else { return };
        if engine.is_running() {
            log("Automation already running; restarting");
        }
        if let Err(e) = engine.start() {
            log(&format!("Failed to start automation: {:#}", e));
        }
    }

    fn stop_dropping() {
        let Some(engine) = engine() else { return };
        if engine.is_running() {
            log("Stop hotkey pressed - stopping automation");
            engine.stop();
        } else {
            log("Stop requested but no automation running");
        }
    }

    fn with_delays(
        action: &str,
        f: impl FnOnce(&ConfigStore, &Path) -> Result<(), potion_dropper::ConfigError>,
    ) {
        let Some(engine) = engine() else { return };
        if let Err(e) = f(engine.config(), &paths::get_delays_path()) {
            log(&format!("{} failed: {}", action, e));
        }
    }

    fn create_message_window() -> Result<HWND> {
        unsafe {
            let hinstance = GetModuleHandleW(None)?;
            let class_name = w!("PotionDropperClass");

            let wc = WNDCLASSW {
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(window_proc),
                hInstance: hinstance.into(),
                lpszClassName: class_name,
                ..Default::default()
            };

            let atom = RegisterClassW(&wc);
            if atom == 0 {
                return Err(anyhow!("Failed to register window class"));
            }

            let hwnd = CreateWindowExW(
                Default::default(),
                class_name,
                w!("Potion Dropper"),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                None,
                None,
                hinstance,
                None,
            )?;

            Ok(hwnd)
        }
    }

    unsafe extern "system" fn window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        unsafe {
            match msg {
                WM_HOTKEY => {
                    match wparam.0 as i32 {
                        HOTKEY_START => start_dropping(),
                        HOTKEY_STOP => stop_dropping(),
                        _ => {}
                    }
                    LRESULT(0)
                }
                WM_TRAYICON => {
                    if (lparam.0 & 0xFFFF) as u32 == WM_RBUTTONUP {
                        show_context_menu(hwnd);
                    }
                    LRESULT(0)
                }
                WM_COMMAND => {
                    match wparam.0 & 0xFFFF {
                        MENU_START => start_dropping(),
                        MENU_STOP => stop_dropping(),
                        MENU_RELOAD_DELAYS => {
                            with_delays("Reload delays", |store, path| store.load_config(path))
                        }
                        MENU_SAVE_DELAYS => {
                            with_delays("Save delays", |store, path| store.save_config(path))
                        }
                        MENU_RESET_DELAYS => with_delays("Reset delays", |store, _| {
                            store.reset_defaults();
                            Ok(())
                        }),
                        MENU_EXIT => {
                            log("Exit requested");
                            PostQuitMessage(0);
                        }
                        _ => {}
                    }
                    LRESULT(0)
                }
                WM_DESTROY => {
                    PostQuitMessage(0);
                    LRESULT(0)
                }
                _ => DefWindowProcW(hwnd, msg, wparam, lparam),
            }
        }
    }

    fn write_tip(nid: &mut NOTIFYICONDATAW, tip: &str) {
        let tip_wide: Vec<u16> = tip.encode_utf16().collect();
        let len = tip_wide.len().min(nid.szTip.len() - 1);
        nid.szTip[..len].copy_from_slice(&tip_wide[..len]);
        nid.szTip[len] = 0;
    }

    fn add_tray_icon(hwnd: HWND) -> Result<()> {
        unsafe {
            let mut nid = NOTIFYICONDATAW {
                cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
                hWnd: hwnd,
                uID: 1,
                uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
                uCallbackMessage: WM_TRAYICON,
                hIcon: LoadIconW(None, IDI_APPLICATION)?,
                ..Default::default()
            };
            write_tip(&mut nid, IDLE_TIP);

            if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
                return Err(anyhow!("Failed to add tray icon"));
            }
            Ok(())
        }
    }

    fn set_tray_tip(hwnd: HWND, tip: &str) {
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            uFlags: NIF_TIP,
            ..Default::default()
        };
        write_tip(&mut nid, tip);
        unsafe {
            let _ = Shell_NotifyIconW(NIM_MODIFY, &nid);
        }
    }

    fn remove_tray_icon(hwnd: HWND) {
        unsafe {
            let nid = NOTIFYICONDATAW {
                cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
                hWnd: hwnd,
                uID: 1,
                ..Default::default()
            };
            let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
        }
    }

    fn show_context_menu(hwnd: HWND) {
        unsafe {
            let menu = match CreatePopupMenu() {
                Ok(menu) => menu,
                Err(e) => {
                    log(&format!("Failed to create tray menu: {}", e));
                    return;
                }
            };

            // Top to bottom; `None` is a separator
            let items = [
                (MENU_START, Some(w!("Start (Ctrl+Shift+A)"))),
                (MENU_STOP, Some(w!("Stop (Ctrl+Shift+Q)"))),
                (0, None),
                (MENU_RELOAD_DELAYS, Some(w!("Reload Delays"))),
                (MENU_SAVE_DELAYS, Some(w!("Save Delays"))),
                (MENU_RESET_DELAYS, Some(w!("Reset Delays"))),
                (0, None),
                (MENU_EXIT, Some(w!("Exit"))),
            ];
            for (id, label) in items {
                let _ = match label {
                    Some(label) => AppendMenuW(menu, MF_STRING, id, label),
                    None => AppendMenuW(menu, MF_SEPARATOR, 0, None),
                };
            }

            let mut pt = POINT::default();
            let _ = GetCursorPos(&mut pt);

            // Required for the menu to work properly
            let _ = SetForegroundWindow(hwnd);

            let _ = TrackPopupMenu(
                menu,
                TPM_BOTTOMALIGN | TPM_LEFTALIGN | TPM_RIGHTBUTTON,
                pt.x,
                pt.y,
                0,
                hwnd,
                None,
            );

            let _ = DestroyMenu(menu);
        }
    }
}
