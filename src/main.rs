//! Cam-audit demo binary: run a capture against a skewed mock backend and
//! print the resulting audit trail.

use std::sync::Arc;

use cam_audit::{
    CaptureMode, DialKind, MemorySink, SessionConfig, SessionController, SurfaceId, Verdict,
};
use cam_audit::mock::{FixedLocation, MemoryStore, MockBackend, MockOpener, StaticCapability};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> cam_audit::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| cam_audit::CameraError::DeviceAccess(err.to_string()))?;
    runtime.block_on(demo())
}

/// Drive one session: the mock hardware silently reports ISO 800 no matter
/// what was requested, and the audit trail catches it.
async fn demo() -> cam_audit::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let session = SessionController::new(
        Arc::new(MockOpener::new(MockBackend::new().with_skewed_iso(800))),
        Arc::new(StaticCapability(true)),
        Arc::new(MemoryStore::new()),
        Arc::new(FixedLocation(Some((48.20817, 16.37382)))),
        sink.clone(),
        SessionConfig::default(),
    );

    session.open("0").await?;
    session.start_preview(SurfaceId(1)).await?;
    session.switch_mode(CaptureMode::Night).await?;

    // Night mode pins ISO and exposure and keeps white balance automatic;
    // the dial angle is stored but only applies once a mode exposes it.
    session.set_dial(DialKind::WhiteBalance, 180.0).await?;

    let locator = session.capture().await?;
    println!("Capture saved: {locator}");

    // A stationary device paired with an active motion effect.
    session.report_motion([0.005, 0.004, 0.01], [0.15, 0.02]).await;

    session.close().await;

    println!("Audit trail:");
    for record in sink.snapshot() {
        let marker = match record.verdict {
            Verdict::Match => "ok ",
            Verdict::Mismatch => "MISMATCH",
            Verdict::Suspicious => "SUSPICIOUS",
        };
        println!(
            "  [{marker}] {:?}: requested {} / hardware {}",
            record.category, record.requested, record.hardware
        );
    }
    Ok(())
}
