//
// Copyright 2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Operator decisions during load recovery

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Stdin, Stdout, Write};

/// Source of yes/no answers when a load needs a human decision
#[cfg_attr(test, mockall::automock)]
pub trait OperatorPrompt {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Asks on a terminal and blocks until a line is entered
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> OperatorPrompt for ConsolePrompt<R, W> {
    fn confirm(&mut self, question: &str) -> bool {
        loop {
            if write!(self.output, "{} (y/n) ", question)
                .and_then(|_| self.output.flush())
                .is_err()
            {
                return false;
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => continue,
            }
        }
    }
}

/// Answers with a fixed script and records what was asked
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompt {
    answers: VecDeque<bool>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Questions asked so far, in order
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl OperatorPrompt for ScriptedPrompt {
    /// Answers "no" once the script runs out.
    fn confirm(&mut self, question: &str) -> bool {
        self.asked.push(question.to_string());
        self.answers.pop_front().unwrap_or(false)
    }
}

/// Non-interactive policy: every recovery question is declined
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclinePrompt;

impl OperatorPrompt for DeclinePrompt {
    fn confirm(&mut self, question: &str) -> bool {
        tracing::warn!("Declining without an operator: {}", question);
        false
    }
}
