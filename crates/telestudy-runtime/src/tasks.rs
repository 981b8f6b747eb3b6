//! Study task catalogue and session ordering.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use telestudy_types::TeleopError;

/// Task the operator practises on before the study tasks.
pub const TRAINING_TASK: &str = "Train";

/// How a task renders progress and terminal feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackStyle {
    /// Permanent green arrow at the goal pose; the task never scores.
    Guide,
    /// Arrow coloured by the graded success level.
    Graded,
    /// `Success!` label on a binary success.
    Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub id: String,
    /// Completes "The next task is to …".
    pub description: String,
    pub feedback: FeedbackStyle,
}

impl TaskSpec {
    pub fn new(id: &str, description: &str, feedback: FeedbackStyle) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            feedback,
        }
    }

    /// Text of the acknowledgment prompt shown before the task.
    pub fn prompt(&self) -> String {
        format!(
            "The next task is to {}. Check out the task summary, then press any key to continue.",
            self.description
        )
    }
}

/// Known tasks, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalogue {
    tasks: HashMap<String, TaskSpec>,
}

impl TaskCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four tasks of the study.
    pub fn study() -> Self {
        let mut catalogue = Self::new();
        catalogue.insert(TaskSpec::new(
            TRAINING_TASK,
            "gain familiarity with the teleoperation interface",
            FeedbackStyle::Guide,
        ));
        catalogue.insert(TaskSpec::new(
            "ConstrainedReorient",
            "place the toppled object upright",
            FeedbackStyle::Graded,
        ));
        catalogue.insert(TaskSpec::new(
            "Bookshelf",
            "remove the green object from the cabinet",
            FeedbackStyle::Label,
        ));
        catalogue.insert(TaskSpec::new(
            "DrawerPick",
            "retrieve the green object from the box",
            FeedbackStyle::Label,
        ));
        catalogue
    }

    pub fn insert(&mut self, spec: TaskSpec) {
        self.tasks.insert(spec.id.clone(), spec);
    }

    /// # Errors
    ///
    /// Returns [`TeleopError::UnknownTask`] when `id` is not in the catalogue.
    pub fn get(&self, id: &str) -> Result<&TaskSpec, TeleopError> {
        self.tasks
            .get(id)
            .ok_or_else(|| TeleopError::UnknownTask(id.to_string()))
    }
}

/// Training task first, then the remaining `tasks` in random order.
///
/// `training` is dropped from `tasks` if listed there, so it runs once.
pub fn session_order<R: Rng + ?Sized>(training: Option<&str>, tasks: &[String], rng: &mut R) -> Vec<String> {
    let mut rest: Vec<String> = tasks
        .iter()
        .filter(|t| Some(t.as_str()) != training)
        .cloned()
        .collect();
    rest.shuffle(rng);
    training.map(str::to_string).into_iter().chain(rest).collect()
}

/// A fresh random robot order for one task.
pub fn robot_order<R: Rng + ?Sized>(robots: &[String], rng: &mut R) -> Vec<String> {
    let mut order = robots.to_vec();
    order.shuffle(rng);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn study_catalogue_has_prompts() {
        let catalogue = TaskCatalogue::study();
        let bookshelf = catalogue.get("Bookshelf").unwrap();
        assert_eq!(
            bookshelf.prompt(),
            "The next task is to remove the green object from the cabinet. \
             Check out the task summary, then press any key to continue."
        );
        assert_eq!(catalogue.get(TRAINING_TASK).unwrap().feedback, FeedbackStyle::Guide);
    }

    #[test]
    fn unknown_task_is_reported() {
        let err = TaskCatalogue::study().get("Juggle").unwrap_err();
        assert_eq!(err, TeleopError::UnknownTask("Juggle".to_string()));
    }

    #[test]
    fn training_runs_first_and_once() {
        let tasks = names(&["ConstrainedReorient", "Train", "Bookshelf", "DrawerPick"]);
        for seed in 0..20 {
            let order = session_order(Some(TRAINING_TASK), &tasks, &mut StdRng::seed_from_u64(seed));
            assert_eq!(order[0], TRAINING_TASK);
            assert_eq!(order.len(), 4);
            assert_eq!(order.iter().filter(|t| *t == TRAINING_TASK).count(), 1);
        }
    }

    #[test]
    fn same_seed_gives_same_order() {
        let tasks = names(&["A", "B", "C", "D", "E"]);
        let a = session_order(None, &tasks, &mut StdRng::seed_from_u64(7));
        let b = session_order(None, &tasks, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, tasks);
    }

    #[test]
    fn robot_order_is_a_permutation() {
        let robots = names(&["Panda", "PandaWrist", "PandaSSLIM"]);
        let mut order = robot_order(&robots, &mut StdRng::seed_from_u64(3));
        order.sort();
        let mut expected = robots.clone();
        expected.sort();
        assert_eq!(order, expected);
    }
}
