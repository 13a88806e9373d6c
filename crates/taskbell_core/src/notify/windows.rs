use crate::error::{AppError, Result};
use crate::notify::{
    Notifier, ReminderPayload, activation_argument, launch_show, parse_activation_argument,
};
use tauri_winrt_notification::Toast;

pub struct WindowsNotifier;

impl Notifier for WindowsNotifier {
    fn deliver(&self, payload: &ReminderPayload) -> Result<()> {
        let task_id = payload.task_id.clone();
        let action = activation_argument(&payload.task_id);

        Toast::new(Toast::POWERSHELL_APP_ID)
            .title(&payload.title)
            .text1(&payload.description)
            .text2(&payload.body)
            .add_button("Open", &action)
            .on_activated(move |args| {
                let target = args
                    .as_deref()
                    .and_then(parse_activation_argument)
                    .unwrap_or_else(|| task_id.clone());
                let _ = launch_show(&target);
                Ok(())
            })
            .show()
            .map_err(|err| AppError::io(err.to_string()))?;
        Ok(())
    }
}
