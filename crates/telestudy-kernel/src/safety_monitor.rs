//! [`SafetyMonitor`] – per-step contact classification.
//!
//! A contact is flagged when exactly one of its two geometries belongs to
//! the [`SafetyGeometrySet`].  Pairs entirely inside the set are robot
//! self-contact; pairs entirely outside it do not involve the robot.
//! Neither is reported.
//!
//! The scan keeps no state between steps: every call walks the contact list
//! the simulation reports for the current step.
//!
//! # Example
//!
//! ```
//! use telestudy_kernel::safety_monitor::{SafetyGeometrySet, SafetyMonitor};
//! use telestudy_types::Contact;
//!
//! let monitor = SafetyMonitor::new(SafetyGeometrySet::new(["finger"]));
//! let names = ["finger", "table"];
//! let contacts = [Contact { geom1: 0, geom2: 1, position: [0.0; 3] }];
//!
//! let flagged: Vec<_> = monitor
//!     .scan(&contacts, |id| names.get(id).map(|n| n.to_string()))
//!     .collect();
//! assert_eq!(flagged.len(), 1);
//! ```

use std::collections::HashSet;

use telestudy_types::{Contact, ContactEvent, VisualMarker};
use tracing::debug;

/// Colour of the translucent sphere drawn at each flagged contact.
pub const CONTACT_MARKER_RGBA: [f32; 4] = [0.592, 0.863, 1.0, 0.4];
/// Radius of the contact sphere, in metres.
pub const CONTACT_MARKER_RADIUS: f64 = 0.02;

/// Geometry names of the robot links and gripper surfaces whose contact
/// with anything else is notable.
#[derive(Debug, Clone, Default)]
pub struct SafetyGeometrySet {
    names: HashSet<String>,
}

impl SafetyGeometrySet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Finger pads, the last two links and the hand of a Panda-family arm.
    pub fn panda_default() -> Self {
        Self::new([
            "robot0_g0_col",
            "robot0_g1_col",
            "robot0_g2_col",
            "robot0_g3_col",
            "robot0_g4_col",
            "robot0_g5_col",
            "robot0_link7_collision",
            "robot0_link6_collision",
            "gripper0_hand_collision",
        ])
    }

    /// Unnamed geometries are never members.
    pub fn contains(&self, name: Option<&str>) -> bool {
        name.is_some_and(|n| self.names.contains(n))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Classifies simulation contacts against a [`SafetyGeometrySet`].
#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    geometry: SafetyGeometrySet,
}

impl SafetyMonitor {
    pub fn new(geometry: SafetyGeometrySet) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &SafetyGeometrySet {
        &self.geometry
    }

    /// Classify every contact, flagged or not.
    pub fn classify<'a, F>(&'a self, contacts: &'a [Contact], names: F) -> impl Iterator<Item = ContactEvent> + 'a
    where
        F: Fn(usize) -> Option<String> + 'a,
    {
        contacts.iter().map(move |c| {
            let geom1_name = names(c.geom1);
            let geom2_name = names(c.geom2);
            let flagged = self.geometry.contains(geom1_name.as_deref())
                != self.geometry.contains(geom2_name.as_deref());
            ContactEvent {
                geom1: c.geom1,
                geom2: c.geom2,
                geom1_name,
                geom2_name,
                position: c.position,
                flagged,
            }
        })
    }

    /// Yield only the flagged contacts of the current step.
    pub fn scan<'a, F>(&'a self, contacts: &'a [Contact], names: F) -> impl Iterator<Item = ContactEvent> + 'a
    where
        F: Fn(usize) -> Option<String> + 'a,
    {
        self.classify(contacts, names).filter(|event| {
            if event.flagged {
                debug!(
                    geom1 = event.geom1_name.as_deref().unwrap_or("?"),
                    geom2 = event.geom2_name.as_deref().unwrap_or("?"),
                    "unsafe contact"
                );
            }
            event.flagged
        })
    }

    /// Feedback marker for a flagged contact.
    pub fn marker_for(event: &ContactEvent) -> VisualMarker {
        VisualMarker::sphere(event.position, CONTACT_MARKER_RADIUS, CONTACT_MARKER_RGBA, "contact")
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new(SafetyGeometrySet::panda_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 5] = [
        "robot0_g0_col",
        "robot0_g1_col",
        "table_collision",
        "shelf_collision",
        "gripper0_hand_collision",
    ];

    fn lookup(id: usize) -> Option<String> {
        NAMES.get(id).map(|n| n.to_string())
    }

    fn contact(geom1: usize, geom2: usize) -> Contact {
        Contact {
            geom1,
            geom2,
            position: [0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn robot_to_environment_contact_is_flagged() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(0, 2)];
        let flagged: Vec<_> = monitor.scan(&contacts, lookup).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].geom1_name.as_deref(), Some("robot0_g0_col"));
        assert_eq!(flagged[0].position, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn flagging_is_symmetric_in_pair_order() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(2, 4)];
        assert_eq!(monitor.scan(&contacts, lookup).count(), 1);
    }

    #[test]
    fn self_contact_is_not_flagged() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(0, 1), contact(4, 0)];
        assert_eq!(monitor.scan(&contacts, lookup).count(), 0);
    }

    #[test]
    fn environment_only_contact_is_not_flagged() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(2, 3)];
        assert_eq!(monitor.scan(&contacts, lookup).count(), 0);
    }

    #[test]
    fn unnamed_geometry_counts_as_outside_the_set() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(0, 99), contact(98, 99)];
        let flagged: Vec<_> = monitor.scan(&contacts, lookup).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].geom2_name, None);
    }

    #[test]
    fn classify_reports_every_contact() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(0, 1), contact(0, 2), contact(2, 3)];
        let flags: Vec<bool> = monitor.classify(&contacts, lookup).map(|e| e.flagged).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn empty_contact_list_yields_nothing() {
        let monitor = SafetyMonitor::default();
        assert_eq!(monitor.scan(&[], lookup).count(), 0);
    }

    #[test]
    fn marker_is_translucent_contact_sphere() {
        let monitor = SafetyMonitor::default();
        let contacts = [contact(0, 2)];
        let event = monitor.scan(&contacts, lookup).next().unwrap();
        let marker = SafetyMonitor::marker_for(&event);
        assert_eq!(marker.label, "contact");
        assert_eq!(marker.rgba, CONTACT_MARKER_RGBA);
        assert_eq!(marker.size, [0.02; 3]);
    }

    #[test]
    fn default_set_covers_fingers_wrist_and_hand() {
        let set = SafetyGeometrySet::panda_default();
        assert_eq!(set.len(), 9);
        assert!(set.contains(Some("robot0_link7_collision")));
        assert!(!set.contains(Some("table_collision")));
        assert!(!set.contains(None));
    }
}
