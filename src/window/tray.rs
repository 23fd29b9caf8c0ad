use std::ffi::c_void;

use windows::{
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM},
        System::LibraryLoader::GetModuleHandleW,
        UI::{
            Shell::{
                NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NOTIFYICONDATAW,
                Shell_NotifyIconW,
            },
            WindowsAndMessaging::{
                AppendMenuW, CREATESTRUCTW, CreatePopupMenu, CreateWindowExW, DefWindowProcW,
                DestroyMenu, DestroyWindow, DispatchMessageW, GWLP_USERDATA, GetCursorPos,
                GetMessageW, GetWindowLongPtrW, HICON, IDI_APPLICATION, LoadIconW, MF_SEPARATOR,
                MF_STRING, MSG, PostMessageW, PostQuitMessage, RegisterClassExW,
                RegisterWindowMessageW, SetForegroundWindow, SetWindowLongPtrW, TPM_RETURNCMD,
                TPM_RIGHTBUTTON, TrackPopupMenu, TranslateMessage, WINDOW_EX_STYLE, WM_DESTROY,
                WM_LBUTTONDBLCLK, WM_LBUTTONUP, WM_NCCREATE, WM_NCDESTROY, WM_NULL,
                WM_RBUTTONDBLCLK, WM_RBUTTONUP, WM_USER, WNDCLASSEXW, WS_OVERLAPPED,
            },
        },
    },
    core::{BOOL, PCWSTR, w},
};

use crate::{
    config::APP_NAME,
    error::{Result, ShellError},
    platform::launch_browser,
};

const WM_TRAY: u32 = WM_USER + 1;
const TRAY_ICON_ID: u32 = 100;
const MENU_OPEN_EDITOR: i32 = 1;
const MENU_EXIT: i32 = 2;

struct TrayState {
    editor_url: String,
    icon: NOTIFYICONDATAW,
    taskbar_created: u32,
}

pub struct TrayWindow {
    hwnd: HWND,
}

impl TrayWindow {
    pub fn new(editor_url: &str) -> Result<Self> {
        let hmodule = unsafe { GetModuleHandleW(None)? };
        let hinstance = HINSTANCE(hmodule.0);
        let class_name = w!("WinHTML_Editor_Tray");

        let wc = WNDCLASSEXW {
            cbSize: size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(window_proc),
            hInstance: hinstance,
            lpszClassName: class_name,
            ..Default::default()
        };
        if unsafe { RegisterClassExW(&wc) } == 0 {
            return Err(ShellError::platform("failed to register the tray window class"));
        }

        let state = Box::new(TrayState {
            editor_url: editor_url.to_string(),
            icon: NOTIFYICONDATAW::default(),
            taskbar_created: unsafe { RegisterWindowMessageW(w!("TaskbarCreated")) },
        });
        let state_ptr = Box::into_raw(state);

        let created = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                class_name,
                w!("WinHTML Editor"),
                WS_OVERLAPPED,
                0,
                0,
                0,
                0,
                None,
                None,
                Some(hinstance),
                Some(state_ptr as *const c_void),
            )
        };
        let hwnd = match created {
            Ok(hwnd) => hwnd,
            Err(error) => {
                // WM_NCCREATE never ran, so the window does not own the state.
                drop(unsafe { Box::from_raw(state_ptr) });
                return Err(error.into());
            }
        };

        if let Some(state) = unsafe { state_from_hwnd(hwnd) } {
            state.icon = notify_icon_data(hwnd, hinstance);
            add_icon(&state.icon);
        }
        tracing::info!("tray icon installed");

        Ok(Self { hwnd })
    }

    /// Pumps messages until Exit is chosen from the tray menu.
    pub fn run(self) {
        let mut message = MSG::default();
        while keep_pumping(unsafe { GetMessageW(&mut message, None, 0, 0) }) {
            unsafe {
                let _ = TranslateMessage(&message);
                DispatchMessageW(&message);
            }
        }
        // WM_DESTROY removes the notification icon.
        unsafe {
            let _ = DestroyWindow(self.hwnd);
        }
        tracing::info!("tray message loop finished");
    }
}

/// `GetMessageW` returns 0 for WM_QUIT and -1 on failure; both end the loop.
fn keep_pumping(result: BOOL) -> bool {
    result.0 > 0
}

fn notify_icon_data(hwnd: HWND, hinstance: HINSTANCE) -> NOTIFYICONDATAW {
    let mut data = NOTIFYICONDATAW {
        cbSize: size_of::<NOTIFYICONDATAW>() as u32,
        hWnd: hwnd,
        uID: TRAY_ICON_ID,
        uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
        uCallbackMessage: WM_TRAY,
        hIcon: load_app_icon(hinstance),
        ..Default::default()
    };
    let tip: Vec<u16> = APP_NAME.encode_utf16().collect();
    let len = tip.len().min(data.szTip.len() - 1);
    data.szTip[..len].copy_from_slice(&tip[..len]);
    data
}

/// Resource id 1 is embedded by the build script; stock icon otherwise.
fn load_app_icon(hinstance: HINSTANCE) -> HICON {
    unsafe { LoadIconW(Some(hinstance), PCWSTR(1 as *const u16)) }
        .or_else(|_| unsafe { LoadIconW(None, IDI_APPLICATION) })
        .unwrap_or_default()
}

fn add_icon(data: &NOTIFYICONDATAW) {
    if !unsafe { Shell_NotifyIconW(NIM_ADD, data) }.as_bool() {
        tracing::warn!("Shell_NotifyIconW(NIM_ADD) failed");
    }
}

fn show_menu(hwnd: HWND) -> Option<i32> {
    let menu = unsafe { CreatePopupMenu() }.ok()?;
    unsafe {
        let _ = AppendMenuW(menu, MF_STRING, MENU_OPEN_EDITOR as usize, w!("Open Editor"));
        let _ = AppendMenuW(menu, MF_SEPARATOR, 0, PCWSTR::null());
        let _ = AppendMenuW(menu, MF_STRING, MENU_EXIT as usize, w!("Exit"));
    }

    let mut cursor = POINT::default();
    let _ = unsafe { GetCursorPos(&mut cursor) };

    // The menu only dismisses on outside clicks when the owner is foreground.
    let command = unsafe {
        let _ = SetForegroundWindow(hwnd);
        let command = TrackPopupMenu(
            menu,
            TPM_RETURNCMD | TPM_RIGHTBUTTON,
            cursor.x,
            cursor.y,
            0,
            hwnd,
            None,
        );
        let _ = PostMessageW(Some(hwnd), WM_NULL, WPARAM(0), LPARAM(0));
        let _ = DestroyMenu(menu);
        command
    };

    (command.0 != 0).then_some(command.0)
}

unsafe fn state_from_hwnd(hwnd: HWND) -> Option<&'static mut TrayState> {
    let ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *mut TrayState;
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &mut *ptr })
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match message {
        WM_NCCREATE => {
            let create_struct = unsafe { &*(lparam.0 as *const CREATESTRUCTW) };
            let state_ptr = create_struct.lpCreateParams as *mut TrayState;
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, state_ptr as isize);
            }
            unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
        }
        WM_TRAY => {
            let Some(state) = (unsafe { state_from_hwnd(hwnd) }) else {
                return LRESULT(0);
            };
            match lparam.0 as u32 {
                WM_LBUTTONUP | WM_LBUTTONDBLCLK => launch_browser(&state.editor_url),
                WM_RBUTTONUP | WM_RBUTTONDBLCLK => match show_menu(hwnd) {
                    Some(MENU_OPEN_EDITOR) => launch_browser(&state.editor_url),
                    Some(MENU_EXIT) => {
                        tracing::info!("exit requested from tray");
                        unsafe { PostQuitMessage(0) };
                    }
                    _ => {}
                },
                _ => {}
            }
            LRESULT(0)
        }
        WM_DESTROY => {
            if let Some(state) = unsafe { state_from_hwnd(hwnd) } {
                let _ = unsafe { Shell_NotifyIconW(NIM_DELETE, &state.icon) };
            }
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        WM_NCDESTROY => {
            let ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *mut TrayState;
            if !ptr.is_null() {
                unsafe {
                    let _ = Box::from_raw(ptr);
                    SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
                }
            }
            unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
        }
        _ => {
            // Explorer restarted: the notification area forgot every icon.
            if let Some(state) = unsafe { state_from_hwnd(hwnd) }
                && state.taskbar_created != 0
                && message == state.taskbar_created
            {
                tracing::info!("taskbar recreated, re-adding tray icon");
                add_icon(&state.icon);
                return LRESULT(0);
            }
            unsafe { DefWindowProcW(hwnd, message, wparam, lparam) }
        }
    }
}
