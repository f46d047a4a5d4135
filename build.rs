fn main() {
    // CoreBluetooth refuses to scan from a binary that has no embedded
    // Info.plist with NSBluetoothAlwaysUsageDescription. Command-line tools
    // have no bundle, so the plist is linked into the __TEXT,__info_plist
    // section instead.
    //
    // CARGO_CFG_TARGET_OS is the target OS, so cross builds to macOS get it too.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS");
    if target_os.as_deref() != Ok("macos") {
        return;
    }

    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR unset, skipping Info.plist embedding");
        return;
    };
    let plist = format!("{manifest_dir}/Info.plist");

    for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
        println!("cargo:rustc-link-arg-bins={arg}");
    }
    println!("cargo:rerun-if-changed=Info.plist");
}
