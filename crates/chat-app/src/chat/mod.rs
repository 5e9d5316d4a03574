/// Single-line composer and its send lifecycle.
pub mod composer;
/// Commands, effects and outcomes exchanged with the store.
pub mod events;
pub mod runner;
pub mod sidebar;
/// Application state container.
pub mod state;
pub mod view;

pub use composer::{Composer, ComposerRejection, ComposerState};
pub use events::{Command, Effect, Outcome};
pub use runner::EffectRunner;
pub use sidebar::{
    ConversationRow, conversation_rows, format_carbon, format_cost, format_relative_date,
    render_conversation_list,
};
pub use state::{ChatStore, CommandRejection, Insight, MainView};
pub use view::{
    composer_prompt, render_empty_view, render_insight, render_message, render_thread,
};
