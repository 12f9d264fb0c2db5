/// Available commands, autocomplete and input parsing
use std::num::NonZeroU32;
use std::str::FromStr;
use thiserror::Error;

use crate::remote::RepoId;
use crate::store::{FilterUpdate, Filters, ParseFilterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
  Search,
  Filter,
  Filters,
  Clear,
  Page,
  Next,
  Prev,
  Size,
  Select,
  Close,
  Retry,
  Refresh,
  Status,
  Help,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
  pub kind: CommandKind,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "search",
    aliases: &["s", "find"],
    usage: "search <text>",
    description: "Search repositories (empty text clears the query)",
    kind: CommandKind::Search,
  },
  Command {
    name: "filter",
    aliases: &["f"],
    usage: "filter <language|min_stars|topics>=<value>",
    description: "Change one filter; an empty value clears it",
    kind: CommandKind::Filter,
  },
  Command {
    name: "filters",
    aliases: &["fs"],
    usage: "filters <name>=<value> ...",
    description: "Replace all filters at once",
    kind: CommandKind::Filters,
  },
  Command {
    name: "clear",
    aliases: &["c", "reset"],
    usage: "clear",
    description: "Remove all filters",
    kind: CommandKind::Clear,
  },
  Command {
    name: "page",
    aliases: &["p", "goto"],
    usage: "page <n>",
    description: "Jump to a results page",
    kind: CommandKind::Page,
  },
  Command {
    name: "next",
    aliases: &["n"],
    usage: "next",
    description: "Next results page",
    kind: CommandKind::Next,
  },
  Command {
    name: "prev",
    aliases: &["previous", "b"],
    usage: "prev",
    description: "Previous results page",
    kind: CommandKind::Prev,
  },
  Command {
    name: "size",
    aliases: &["ps", "per-page"],
    usage: "size <n>",
    description: "Results per page",
    kind: CommandKind::Size,
  },
  Command {
    name: "select",
    aliases: &["open", "o"],
    usage: "select <id|#index>",
    description: "Show a repository by id or by its position in the results",
    kind: CommandKind::Select,
  },
  Command {
    name: "close",
    aliases: &["x"],
    usage: "close",
    description: "Close the repository details",
    kind: CommandKind::Close,
  },
  Command {
    name: "retry",
    aliases: &["r"],
    usage: "retry",
    description: "Refetch failed queries",
    kind: CommandKind::Retry,
  },
  Command {
    name: "refresh",
    aliases: &["reload"],
    usage: "refresh",
    description: "Revalidate stale data",
    kind: CommandKind::Refresh,
  },
  Command {
    name: "status",
    aliases: &["st", "state"],
    usage: "status",
    description: "Show the current search state and cache size",
    kind: CommandKind::Status,
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
    kind: CommandKind::Help,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit repolens",
    kind: CommandKind::Quit,
  },
];

fn ranked(input: &str) -> Vec<(&'static Command, u32)> {
  let input_lower = input.to_lowercase();

  let mut matches: Vec<(&'static Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);
  matches
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }
  ranked(input).into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve a typed command word. Fails when nothing matches or when the best
/// matches tie.
pub fn resolve(word: &str) -> Result<&'static Command, ParseInputError> {
  let matches = ranked(word);
  let Some(&(best, priority)) = matches.first() else {
    return Err(ParseInputError::UnknownCommand(word.to_string()));
  };

  let tied: Vec<&'static str> = matches
    .iter()
    .filter(|(_, p)| *p == priority)
    .map(|(cmd, _)| cmd.name)
    .collect();
  if tied.len() > 1 {
    return Err(ParseInputError::Ambiguous {
      input: word.to_string(),
      candidates: tied.join(", "),
    });
  }
  Ok(best)
}

/// Which repository `select` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
  Id(RepoId),
  /// 1-based position on the current results page
  Index(usize),
}

/// One parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
  Search(String),
  Filter(FilterUpdate),
  Filters(Filters),
  Clear,
  Page(u32),
  Next,
  Prev,
  Size(NonZeroU32),
  Select(Selector),
  Close,
  Retry,
  Refresh,
  Status,
  Help,
  Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseInputError {
  #[error("no command given")]
  Empty,
  #[error("unknown command '{0}' (type 'help')")]
  UnknownCommand(String),
  #[error("'{input}' is ambiguous: {candidates}")]
  Ambiguous { input: String, candidates: String },
  #[error("usage: {0}")]
  Usage(&'static str),
  #[error(transparent)]
  Filter(#[from] ParseFilterError),
}

impl FromStr for Input {
  type Err = ParseInputError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let line = line.trim();
    if line.is_empty() {
      return Err(ParseInputError::Empty);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let cmd = resolve(word)?;
    let usage = || ParseInputError::Usage(cmd.usage);

    let input = match cmd.kind {
      CommandKind::Search => Input::Search(rest.to_string()),
      CommandKind::Filter => {
        if rest.is_empty() {
          return Err(usage());
        }
        Input::Filter(rest.parse()?)
      }
      CommandKind::Filters => {
        let mut filters = Filters::default();
        for pair in rest.split_whitespace() {
          filters.apply(pair.parse()?);
        }
        Input::Filters(filters)
      }
      CommandKind::Clear => Input::Clear,
      CommandKind::Page => Input::Page(rest.parse().map_err(|_| usage())?),
      CommandKind::Next => Input::Next,
      CommandKind::Prev => Input::Prev,
      CommandKind::Size => Input::Size(rest.parse().map_err(|_| usage())?),
      CommandKind::Select => {
        let selector = match rest.strip_prefix('#') {
          Some(index) => match index.parse::<usize>() {
            Ok(index) if index > 0 => Selector::Index(index),
            _ => return Err(usage()),
          },
          None => Selector::Id(rest.parse().map_err(|_| usage())?),
        };
        Input::Select(selector)
      }
      CommandKind::Close => Input::Close,
      CommandKind::Retry => Input::Retry,
      CommandKind::Refresh => Input::Refresh,
      CommandKind::Status => Input::Status,
      CommandKind::Help => Input::Help,
      CommandKind::Quit => Input::Quit,
    };
    Ok(input)
  }
}
