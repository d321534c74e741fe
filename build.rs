use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Embed the Windows manifest that declares per-monitor DPI awareness
    let _ = embed_resource::compile("potion-dropper.rc", embed_resource::NONE);

    println!("cargo:rerun-if-changed=potion-dropper.rc");
    println!("cargo:rerun-if-changed=potion-dropper.manifest");

    // Copy configuration and swatch assets next to the executable
    let Some(target_dir) = target_dir() else {
        println!("cargo:warning=Could not find target directory; assets not copied");
        return;
    };
    copy_tree("configuration", &target_dir);
    copy_tree("assets", &target_dir);
}

/// OUT_DIR is something like target/release/build/potion-dropper-xxx/out;
/// the executable lives three levels up.
fn target_dir() -> Option<PathBuf> {
    let out_dir = env::var("OUT_DIR").ok()?;
    Path::new(&out_dir).ancestors().nth(3).map(Path::to_path_buf)
}

fn copy_tree(name: &str, target_dir: &Path) {
    let src = Path::new(name);
    if src.exists() {
        copy_dir_recursive(src, &target_dir.join(name));
        println!("cargo:rerun-if-changed={}/", name);
    }
}

/// Recursively copies a directory and its contents.
fn copy_dir_recursive(src: &Path, dst: &Path) {
    let _ = fs::create_dir_all(dst);

    if let Ok(entries) = fs::read_dir(src) {
        for entry in entries.flatten() {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if src_path.is_dir() {
                copy_dir_recursive(&src_path, &dst_path);
            } else {
                let _ = fs::copy(&src_path, &dst_path);
            }
        }
    }
}
