use posecam::{
    app::App,
    config::Config,
    gui,
    media::MediaConstraints,
    nn::OnnxPoseLandmarker,
    session::{ModelSession, PoseLandmarker, PoseLandmarkerOptions, RunningMode},
    webcam::WebcamDevices,
};

fn main() -> anyhow::Result<()> {
    posecam::init_logger!();

    log::info!("🎓 ISTEduca - Detección de Poses con IA");
    log::info!("Activa la cámara con Espacio o Enter; Escape para salir.");

    let config = Config::from_env();
    log::debug!("{config:?}");

    let options = PoseLandmarkerOptions::new(&config.model_path)
        .delegate(config.delegate)
        .running_mode(RunningMode::Video)
        .num_poses(config.num_poses);
    let session = ModelSession::load(move || {
        let landmarker = OnnxPoseLandmarker::load(options)?;
        Ok(Box::new(landmarker) as Box<dyn PoseLandmarker>)
    })?;

    let (width, height) = config.ideal_resolution;
    let devices = WebcamDevices::new(config.webcam_name);
    let app = App::new(
        session,
        Box::new(devices),
        MediaConstraints::ideal(width, height),
    );

    gui::run(app)
}
