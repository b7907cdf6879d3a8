use std::env;

use dicom_mpr::{CalibrationOptions, MprSession, Slicer, SortBy, VolumeLoader};
use log::{error, info};

fn main() {
    env_logger::init();

    let directory = env::args().nth(1).unwrap_or_else(|| "dicom".to_string());
    let session = match VolumeLoader::load_from_directory(
        &directory,
        SortBy::ImagePositionPatient,
        CalibrationOptions::default(),
    )
    .map_err(|e| e.to_string())
    .and_then(|series| {
        MprSession::new(series.dataset, series.transform).map_err(|e| e.to_string())
    }) {
        Ok(session) => session,
        Err(e) => {
            error!("Could not load series from {directory}: {e}");
            MprSession::placeholder()
        }
    };

    let slicer = Slicer::new(session.dataset()).with_window(session.window());
    for (orientation, plane) in session.tri_planar() {
        let Some(image) = slicer.render_isotropic(&plane) else {
            error!("Could not render {} plane", orientation.title());
            continue;
        };
        let path = format!("{}.png", orientation.title().to_lowercase());
        match image.save(&path) {
            Ok(()) => info!("Saved {path}"),
            Err(e) => error!("Could not save {path}: {e}"),
        }
    }
}
