//! The UI boundary: the handful of elements the application writes to.
//!
//! [`Dom`] is a plain model of the page. The [`gui`][crate::gui] presents it, and tests inspect
//! it directly.

use std::collections::BTreeSet;

/// Label of the toggle while the camera is off.
pub const LABEL_ACTIVATE: &str = "Activar Cámara";
/// Label of the toggle while the camera is on.
pub const LABEL_DEACTIVATE: &str = "Desactivar Cámara";

/// Class marking the toggle as active.
pub const CLASS_ACTIVE: &str = "active";
/// Class hiding a container.
pub const CLASS_HIDDEN: &str = "hidden";

/// An element with a set of CSS-like classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassList {
    classes: BTreeSet<&'static str>,
}

impl ClassList {
    pub fn with(class: &'static str) -> Self {
        let mut list = Self::default();
        list.add(class);
        list
    }

    pub fn add(&mut self, class: &'static str) {
        self.classes.insert(class);
    }

    pub fn remove(&mut self, class: &'static str) {
        self.classes.remove(class);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

/// The camera toggle button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle {
    pub label: String,
    pub classes: ClassList,
    pub disabled: bool,
}

impl Toggle {
    pub fn is_active(&self) -> bool {
        self.classes.contains(CLASS_ACTIVE)
    }
}

impl Default for Toggle {
    fn default() -> Self {
        Self {
            label: LABEL_ACTIVATE.into(),
            classes: ClassList::default(),
            disabled: false,
        }
    }
}

/// All UI elements the application touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dom {
    pub status: String,
    pub pose_count: String,
    pub confidence: String,
    pub toggle: Toggle,
    pub video_container: ClassList,
    pub challenges_section: ClassList,
}

impl Default for Dom {
    /// The initial page: camera off, both containers hidden, no statistics yet.
    fn default() -> Self {
        Self {
            status: String::new(),
            pose_count: "0".into(),
            confidence: "-".into(),
            toggle: Toggle::default(),
            video_container: ClassList::with(CLASS_HIDDEN),
            challenges_section: ClassList::with(CLASS_HIDDEN),
        }
    }
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_video_visible(&self) -> bool {
        !self.video_container.contains(CLASS_HIDDEN)
    }

    /// Puts the toggle and both containers into the state matching `running`.
    pub fn show_camera(&mut self, running: bool) {
        if running {
            self.toggle.label = LABEL_DEACTIVATE.into();
            self.toggle.classes.add(CLASS_ACTIVE);
            self.video_container.remove(CLASS_HIDDEN);
            self.challenges_section.remove(CLASS_HIDDEN);
        } else {
            self.toggle.label = LABEL_ACTIVATE.into();
            self.toggle.classes.remove(CLASS_ACTIVE);
            self.video_container.add(CLASS_HIDDEN);
            self.challenges_section.add(CLASS_HIDDEN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_page() {
        let dom = Dom::new();
        assert_eq!(dom.toggle.label, LABEL_ACTIVATE);
        assert!(!dom.toggle.is_active());
        assert!(!dom.is_video_visible());
        assert!(dom.challenges_section.contains(CLASS_HIDDEN));
    }

    #[test]
    fn show_camera_round_trip() {
        let mut dom = Dom::new();
        dom.show_camera(true);
        assert_eq!(dom.toggle.label, LABEL_DEACTIVATE);
        assert!(dom.toggle.is_active());
        assert!(dom.is_video_visible());
        assert!(!dom.challenges_section.contains(CLASS_HIDDEN));

        dom.show_camera(false);
        assert_eq!(dom, Dom::new());
    }
}
