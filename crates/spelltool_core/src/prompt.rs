use std::io;

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};

/// Question/answer capability. `Ok(None)` from `ask` means the input is
/// exhausted.
///
/// `confirm` and `decide` default to plain `ask` with a `(y/n)` or
/// `(y/n/q)` suffix; the terminal implementation replaces them with proper
/// widgets.
pub trait Prompt {
    fn ask(&mut self, question: &str) -> Result<Option<String>>;

    /// Anything but an explicit yes is a no, including end of input.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(self
            .ask(&format!("{question} (y/n): "))?
            .is_some_and(|answer| is_yes(&answer)))
    }

    /// End of input reads as quit.
    fn decide(&mut self, question: &str) -> Result<Decision> {
        Ok(self
            .ask(&format!("{question} (y/n/q): "))?
            .map_or(Decision::Quit, |answer| Decision::parse(&answer)))
    }
}

const DECISION_ITEMS: [&str; 3] = ["yes, update", "no, skip", "quit"];

/// Interactive terminal prompt. Without a terminal every question reads as
/// end of input.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<Option<String>> {
        let answer = Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text();
        Ok(interaction(answer)?.map(|line| line.trim().to_string()))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact_opt();
        Ok(interaction(answer)?.flatten().unwrap_or(false))
    }

    fn decide(&mut self, question: &str) -> Result<Decision> {
        let answer = Select::new()
            .with_prompt(question)
            .items(&DECISION_ITEMS)
            .default(0)
            .interact_opt();
        Ok(match interaction(answer)?.flatten() {
            Some(0) => Decision::Accept,
            Some(1) => Decision::Skip,
            _ => Decision::Quit,
        })
    }
}

fn interaction<T>(result: dialoguer::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(dialoguer::Error::IO(error))
            if matches!(
                error.kind(),
                io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof
            ) =>
        {
            log::debug!("prompt input closed: {error}");
            Ok(None)
        }
        Err(error) => Err(error).context("failed to read answer from terminal"),
    }
}

pub fn confirm<P: Prompt + ?Sized>(prompt: &mut P, question: &str) -> Result<bool> {
    prompt.confirm(question)
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Answer to "use this suggestion?" during an interactive review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Skip,
    Quit,
}

impl Decision {
    pub fn parse(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Self::Accept,
            "q" | "quit" | "exit" => Self::Quit,
            _ => Self::Skip,
        }
    }
}

pub fn ask_decision<P: Prompt + ?Sized>(prompt: &mut P, question: &str) -> Result<Decision> {
    prompt.decide(question)
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;

    use anyhow::Result;

    use super::Prompt;

    /// Replays canned answers and records what was asked.
    #[derive(Default)]
    pub(crate) struct ScriptedPrompt {
        answers: VecDeque<String>,
        pub(crate) questions: Vec<String>,
    }

    impl ScriptedPrompt {
        pub(crate) fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|answer| answer.to_string()).collect(),
                questions: Vec::new(),
            }
        }
    }

    impl Prompt for ScriptedPrompt {
        fn ask(&mut self, question: &str) -> Result<Option<String>> {
            self.questions.push(question.to_string());
            Ok(self.answers.pop_front())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedPrompt;
    use super::*;

    #[test]
    fn confirm_requires_explicit_yes() {
        let mut prompt = ScriptedPrompt::new(&["YES", "n", ""]);
        assert!(confirm(&mut prompt, "Save changes?").expect("ask"));
        assert!(!confirm(&mut prompt, "Save changes?").expect("ask"));
        assert!(!confirm(&mut prompt, "Save changes?").expect("ask"));
        assert!(!confirm(&mut prompt, "Save changes?").expect("exhausted"));
        assert_eq!(prompt.questions[0], "Save changes? (y/n): ");
    }

    #[test]
    fn decisions_parse_loosely() {
        assert_eq!(Decision::parse(" y "), Decision::Accept);
        assert_eq!(Decision::parse("Quit"), Decision::Quit);
        assert_eq!(Decision::parse("maybe"), Decision::Skip);

        let mut prompt = ScriptedPrompt::new(&[]);
        assert_eq!(ask_decision(&mut prompt, "Use 871?").expect("ask"), Decision::Quit);
    }

    #[test]
    fn closed_terminal_reads_as_end_of_input() {
        let closed = Err::<bool, _>(dialoguer::Error::IO(io::Error::new(
            io::ErrorKind::NotConnected,
            "not a terminal",
        )));
        assert_eq!(interaction(closed).expect("closed"), None);

        let broken = Err::<bool, _>(dialoguer::Error::IO(io::Error::other("tty gone")));
        assert!(interaction(broken).is_err());
        assert_eq!(interaction(Ok(true)).expect("answer"), Some(true));
    }
}
