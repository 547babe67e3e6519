//! Scripted Prompter
//!
//! Replays a fixed list of answers; used to drive interactive flows in tests.

use crate::domain::ports::Prompter;
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Prompter that answers from a queue
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    /// Questions and notes in the order they were shown
    pub transcript: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, question: &str) -> Result<String> {
        self.transcript.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| Error::Prompt(format!("no scripted answer for {:?}", question)))
    }
}

impl Prompter for ScriptedPrompter {
    fn note(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }

    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let answer = self.next(question)?;
        match (answer.is_empty(), default) {
            (true, Some(default)) => Ok(default.to_string()),
            _ => Ok(answer),
        }
    }

    fn ask_secret(&mut self, question: &str) -> Result<String> {
        self.next(question)
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let answer = self.next(question)?;
        Ok(match answer.trim() {
            "" => default,
            a => matches!(a, "y" | "Y" | "yes" | "Yes"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_replay_and_defaults() {
        let mut p = ScriptedPrompter::new(["", "value", "n", ""]);
        assert_eq!(p.ask("a?", Some("dflt")).unwrap(), "dflt");
        assert_eq!(p.ask("b?", None).unwrap(), "value");
        assert!(!p.confirm("c?", true).unwrap());
        assert!(p.confirm("d?", true).unwrap());
        assert_eq!(p.remaining(), 0);
        assert_matches!(p.ask("e?", None), Err(Error::Prompt(_)));
        assert_eq!(p.transcript.len(), 5);
    }
}
