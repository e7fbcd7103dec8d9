//! Detection statistics and the status panel.

use crate::ui::Dom;

pub const STATUS_LOADING_MODEL: &str = "Cargando modelo de IA...";
pub const STATUS_MODEL_LOADED: &str = "Modelo cargado ✓";
pub const STATUS_MODEL_FAILED: &str = "Error al cargar el modelo";
pub const STATUS_MODEL_NOT_READY: &str = "Espera, cargando modelo...";
pub const STATUS_CAMERA_OFF: &str = "Cámara desactivada";
pub const STATUS_CAMERA_STARTING: &str = "Iniciando cámara...";
pub const STATUS_CAMERA_ACTIVE: &str = "Cámara activa - Detectando poses...";
pub const STATUS_CAMERA_ERROR: &str = "Error: No se pudo acceder a la cámara";
pub const STATUS_CAMERA_UNSUPPORTED: &str = "Cámara no disponible";
pub const STATUS_WAITING_FOR_PERSON: &str = "👀 Esperando persona en cuadro...";

/// Status shown after a frame in which `pose_count` people were detected.
pub fn detection_status(pose_count: usize) -> String {
    if pose_count > 0 {
        format!("✅ Detectando {pose_count} pose(s)")
    } else {
        STATUS_WAITING_FOR_PERSON.into()
    }
}

/// Statistics of the most recent detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionStats {
    pub pose_count: usize,
    /// Average landmark visibility of the last reported pose, in `[0, 1]`. `0` when there is none.
    pub confidence: f32,
    pub status: String,
}

impl DetectionStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Formats a confidence value for display, or `-` if there is none.
pub fn format_confidence(confidence: f32) -> String {
    if confidence > 0.0 {
        format!("{:.1}%", confidence * 100.0)
    } else {
        "-".into()
    }
}

/// Sets the status message and shows it.
pub fn update_status(stats: &mut DetectionStats, dom: &mut Dom, text: impl Into<String>) {
    let text = text.into();
    if stats.status != text {
        log::debug!("status: {text}");
    }
    dom.status.clone_from(&text);
    stats.status = text;
}

/// Shows the pose count and confidence.
pub fn update_stats(stats: &DetectionStats, dom: &mut Dom) {
    dom.pose_count = stats.pose_count.to_string();
    dom.confidence = format_confidence(stats.confidence);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_formatting() {
        assert_eq!(format_confidence(0.0), "-");
        assert_eq!(format_confidence(0.25), "25.0%");
        assert_eq!(format_confidence(1.0), "100.0%");
    }

    #[test]
    fn stats_are_written_to_dom() {
        let mut dom = Dom::new();
        let stats = DetectionStats {
            pose_count: 2,
            confidence: 0.5,
            status: String::new(),
        };
        update_stats(&stats, &mut dom);
        assert_eq!(dom.pose_count, "2");
        assert_eq!(dom.confidence, "50.0%");
    }

    #[test]
    fn status_messages() {
        let mut dom = Dom::new();
        let mut stats = DetectionStats::new();
        update_status(&mut stats, &mut dom, detection_status(1));
        assert_eq!(dom.status, "✅ Detectando 1 pose(s)");
        assert_eq!(stats.status, dom.status);
        update_status(&mut stats, &mut dom, detection_status(0));
        assert_eq!(dom.status, STATUS_WAITING_FOR_PERSON);
    }
}
