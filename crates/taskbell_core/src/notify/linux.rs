use crate::error::{AppError, Result};
use crate::model::Priority;
use crate::notify::{Notifier, ReminderPayload, activation_argument, launch_show};
use notify_rust::{Notification, Urgency};

pub struct LinuxNotifier;

fn urgency_for(priority: Priority) -> Urgency {
    match priority {
        Priority::High => Urgency::Critical,
        Priority::Medium => Urgency::Normal,
        Priority::Low => Urgency::Low,
    }
}

impl Notifier for LinuxNotifier {
    fn deliver(&self, payload: &ReminderPayload) -> Result<()> {
        let action = activation_argument(&payload.task_id);
        let handle = Notification::new()
            .appname("taskbell")
            .summary(&format!("{}: {}", payload.title, payload.description))
            .body(&payload.body)
            .urgency(urgency_for(payload.priority))
            .action(&action, "Open")
            .show()
            .map_err(|err| AppError::io(err.to_string()))?;

        let task_id = payload.task_id.clone();
        std::thread::spawn(move || {
            handle.wait_for_action(|selected| {
                if selected == action || selected == "default" {
                    let _ = launch_show(&task_id);
                }
            });
        });

        Ok(())
    }
}
