//! Monkey REPL - interactive console with persistent state.

pub mod session;

pub use session::{Session, SessionError};

use std::borrow::Cow;

use monkey_syntax::eprint_errors;
use reedline::{
    FileBackedHistory, Prompt, PromptEditMode, PromptHistorySearch, Reedline, Signal,
};

struct MonkeyPrompt;

impl Prompt for MonkeyPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed(">> ")
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _edit_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed(".. ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        Cow::Borrowed("search: ")
    }
}

/// Run the interactive loop until EOF or interrupt. Every line's value
/// is echoed in inspect form; errors are reported without ending the
/// session.
pub fn run(session: &mut Session) {
    let mut line_editor =
        Reedline::create().with_history(Box::new(FileBackedHistory::default()));
    let prompt = MonkeyPrompt;

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match session.eval(&line) {
                    Ok(value) => println!("{}", value.inspect()),
                    Err(SessionError::Parse(errors)) => {
                        eprint_errors(&errors, "<repl>", &line);
                    }
                    Err(SessionError::Compile(err)) => {
                        err.to_source_error().eprint("<repl>", &line);
                    }
                    Err(SessionError::Runtime(err)) => {
                        eprintln!("runtime error: {}", err);
                    }
                }
            }
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => break,
            Err(err) => {
                eprintln!("error reading input: {}", err);
                break;
            }
        }
    }
}
