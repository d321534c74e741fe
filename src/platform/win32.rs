//! Win32 desktop backend: window enumeration, GDI screen grabs and
//! SendInput mouse events.

use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::ffi::{c_void, OsString};
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    BitBlt, ClientToScreen, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    GetDC, GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VK_ESCAPE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetClientRect, GetCursorPos, GetSystemMetrics,
    GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow,
    IsWindowVisible, SetCursorPos, SetForegroundWindow, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN,
    SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
};

use super::{Desktop, MouseButton, Rect, WindowId, WindowInfo};

fn hwnd(id: WindowId) -> HWND {
    HWND(id.0 as *mut c_void)
}

#[derive(Debug, Default)]
pub struct Win32Desktop;

impl Win32Desktop {
    pub fn new() -> Self {
        Self
    }
}

impl Desktop for Win32Desktop {
    fn list_windows(&self) -> Vec<WindowInfo> {
        unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
            unsafe {
                let windows = &mut *(lparam.0 as *mut Vec<WindowInfo>);

                if !IsWindowVisible(hwnd).as_bool() {
                    return TRUE;
                }

                let title = window_title(hwnd);
                // Untitled windows are never the game's main window
                if title.is_empty() {
                    return TRUE;
                }

                windows.push(WindowInfo {
                    id: WindowId(hwnd.0 as usize),
                    title,
                    class_name: class_name(hwnd),
                    process_name: process_name(hwnd).unwrap_or_default(),
                });
                TRUE
            }
        }

        let mut windows: Vec<WindowInfo> = Vec::new();
        unsafe {
            let _ = EnumWindows(Some(enum_callback), LPARAM(&mut windows as *mut _ as isize));
        }
        windows
    }

    fn client_rect(&self, id: WindowId) -> Option<Rect> {
        let hwnd = hwnd(id);
        unsafe {
            if !IsWindow(hwnd).as_bool() || IsIconic(hwnd).as_bool() {
                return None;
            }
            let mut client = RECT::default();
            GetClientRect(hwnd, &mut client).ok()?;
            let mut origin = POINT { x: 0, y: 0 };
            if !ClientToScreen(hwnd, &mut origin).as_bool() {
                return None;
            }
            Some(Rect::new(
                origin.x,
                origin.y,
                (client.right - client.left).max(0) as u32,
                (client.bottom - client.top).max(0) as u32,
            ))
        }
    }

    fn screen_bounds(&self) -> Rect {
        unsafe {
            Rect::new(
                GetSystemMetrics(SM_XVIRTUALSCREEN),
                GetSystemMetrics(SM_YVIRTUALSCREEN),
                GetSystemMetrics(SM_CXVIRTUALSCREEN).max(0) as u32,
                GetSystemMetrics(SM_CYVIRTUALSCREEN).max(0) as u32,
            )
        }
    }

    fn grab(&self, rect: &Rect) -> Result<RgbaImage> {
        let width = rect.width as i32;
        let height = rect.height as i32;
        if width <= 0 || height <= 0 {
            return Err(anyhow!("Empty capture rectangle"));
        }

        let mut bgra = vec![0u8; rect.width as usize * rect.height as usize * 4];
        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return Err(anyhow!("GetDC failed"));
            }
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let previous = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc, 0, 0, width, height, screen_dc, rect.x, rect.y, SRCCOPY,
            );
            SelectObject(mem_dc, previous);

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height: top-down rows
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = if blit.is_ok() {
                GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(bgra.as_mut_ptr() as *mut c_void),
                    &mut info,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);

            blit.map_err(|e| anyhow!("BitBlt failed: {}", e))?;
            if lines != height {
                return Err(anyhow!("GetDIBits copied {} of {} rows", lines, height));
            }
        }

        // BGRA -> RGBA, forcing opaque alpha
        for px in bgra.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = 255;
        }
        RgbaImage::from_raw(rect.width, rect.height, bgra)
            .ok_or_else(|| anyhow!("Failed to create image from captured buffer"))
    }

    fn cursor_position(&self) -> Result<(i32, i32)> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point)? };
        Ok((point.x, point.y))
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<()> {
        unsafe { SetCursorPos(x, y)? };
        Ok(())
    }

    fn press(&self, button: MouseButton) -> Result<()> {
        let flags = match button {
            MouseButton::Left => MOUSEEVENTF_LEFTDOWN,
            MouseButton::Right => MOUSEEVENTF_RIGHTDOWN,
        };
        send_mouse(flags)
    }

    fn release(&self, button: MouseButton) -> Result<()> {
        let flags = match button {
            MouseButton::Left => MOUSEEVENTF_LEFTUP,
            MouseButton::Right => MOUSEEVENTF_RIGHTUP,
        };
        send_mouse(flags)
    }

    fn focus(&self, id: WindowId) -> Result<()> {
        unsafe {
            let _ = SetForegroundWindow(hwnd(id));
        }
        Ok(())
    }

    fn stop_key_pressed(&self) -> bool {
        // High bit set while the key is held
        unsafe { (GetAsyncKeyState(VK_ESCAPE.0 as i32) as u16 & 0x8000) != 0 }
    }
}

/// Sends one button event at the current cursor position.
fn send_mouse(flags: MOUSE_EVENT_FLAGS) -> Result<()> {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dwFlags: flags,
                ..Default::default()
            },
        },
    };
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 1 {
        Ok(())
    } else {
        Err(anyhow!("SendInput rejected mouse event {:?}", flags))
    }
}

unsafe fn window_title(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf: Vec<u16> = vec![0; (len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut buf).max(0) as usize;
        OsString::from_wide(&buf[..copied])
            .to_string_lossy()
            .to_string()
    }
}

unsafe fn class_name(hwnd: HWND) -> String {
    unsafe {
        let mut buf: Vec<u16> = vec![0; 256];
        let len = GetClassNameW(hwnd, &mut buf).max(0) as usize;
        OsString::from_wide(&buf[..len]).to_string_lossy().to_string()
    }
}

/// Executable file name of the process owning `hwnd`.
unsafe fn process_name(hwnd: HWND) -> Option<String> {
    unsafe {
        let mut process_id: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));
        if process_id == 0 {
            return None;
        }

        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;
        let mut name_buf: Vec<u16> = vec![0; 1024];
        let mut len = name_buf.len() as u32;
        let result = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(name_buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(handle);
        if result.is_err() || len == 0 {
            return None;
        }

        let full_path = OsString::from_wide(&name_buf[..len as usize])
            .to_string_lossy()
            .to_string();
        full_path.rsplit('\\').next().map(str::to_string)
    }
}
