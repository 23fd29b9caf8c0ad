use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=resources/app.manifest");
    println!("cargo:rerun-if-changed=assets/icons/app.ico");

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
        let mut res = winres::WindowsResource::new();

        if Path::new("resources/app.manifest").exists() {
            res.set_manifest_file("resources/app.manifest");
        }
        // Resource id 1 is what the tray loads before falling back to IDI_APPLICATION.
        if Path::new("assets/icons/app.ico").exists() {
            res.set_icon_with_id("assets/icons/app.ico", "1");
        }

        if let Err(error) = res.compile() {
            panic!("failed to compile Windows resources: {error}");
        }
    }
}
