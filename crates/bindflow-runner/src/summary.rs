use crate::controller::TaskOutcome;
use bindflow_core::model::TaskState;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};

fn state_color(state: &TaskState) -> Color {
    match state {
        TaskState::Succeeded => Color::Green,
        TaskState::Failed => Color::Red,
        TaskState::AwaitingCheck => Color::Magenta,
        _ => Color::Yellow,
    }
}

/// End-of-run table with one row per task the run touched.
pub fn render(outcomes: &[TaskOutcome]) -> String {
    let header = ["Stage", "Subject", "Directory", "State", "Recoveries"];
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| {
            Cell::new(h)
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan)
        }));

    for outcome in outcomes {
        table.add_row(vec![
            Cell::new(outcome.task.stage.to_string()),
            Cell::new(&outcome.task.subject),
            Cell::new(outcome.task.work_dir.to_string_lossy().as_ref()),
            Cell::new(outcome.state.to_string()).fg(state_color(&outcome.state)),
            Cell::new(outcome.recoveries),
        ]);
    }
    table.to_string()
}
