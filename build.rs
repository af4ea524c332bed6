fn main() {
    // ── macOS: embed Info.plist so CoreBluetooth lets the CLI scan ────────────
    //
    // A bare command-line binary has no app bundle, and CBCentralManager stays
    // "unauthorised" unless the process carries NSBluetoothAlwaysUsageDescription.
    // Linking the plist into the __TEXT,__info_plist section gives the binary
    // the same Info.plist an app bundle would have.
    //
    // CARGO_CFG_TARGET_OS is the target, not the host, so cross builds work.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");
        let plist = format!("{dir}/Info.plist");

        //   ld … -sectcreate __TEXT __info_plist <plist>
        for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
            println!("cargo:rustc-link-arg-bins={arg}");
        }
        println!("cargo:rerun-if-changed=Info.plist");
    }
}
