use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui::{OutputFormat, get_output_format};

pub fn create_spinner(message: String) -> ProgressBar {
    // Spinners would corrupt JSON lines
    if matches!(get_output_format(), OutputFormat::Json) {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Block for `duration` while showing a spinner with `message`.
pub fn wait_with_spinner(message: impl Into<String>, duration: Duration) {
    let pb = create_spinner(message.into());
    std::thread::sleep(duration);
    pb.finish_and_clear();
}
