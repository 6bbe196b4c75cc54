//! Build script: embeds the git hash and checks for system OpenCV when the
//! camera feature is on.
//!
//! The `opencv` crate fails deep inside its own build when the library is
//! missing; a clear message up front saves a scroll through bindgen output.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "opencv-camera") {
        check_opencv();
    }
}

fn check_opencv() {
    let found = ["opencv4", "opencv"].iter().any(|name| {
        Command::new("pkg-config")
            .args(["--exists", name])
            .status()
            .is_ok_and(|s| s.success())
    });

    if found {
        println!("cargo::warning=OpenCV detected");
        return;
    }

    panic!(
        "\n\n\
        ╔══════════════════════════════════════════════════════════╗\n\
        ║  OpenCV not found (pkg-config opencv4).                  ║\n\
        ║                                                          ║\n\
        ║  Install: sudo apt install libopencv-dev clang libclang-dev ║\n\
        ║  Or build without the camera and use camera.still_image  ║\n\
        ╚══════════════════════════════════════════════════════════╝\n",
    );
}
