use crate::commands::{Input, Selector, COMMANDS};
use crate::event::{Event, EventHandler};
use crate::query::QueryState;
use crate::remote::{RepoDetail, RepoSummary};
use crate::session::Session;
use crate::store::{Action, AppState};
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info};

/// README lines shown under the details
const README_PREVIEW_LINES: usize = 20;

/// Languages listed in the breakdown
const LANGUAGE_LIMIT: usize = 5;

/// Main application state
pub struct App {
  session: Session,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(session: Session) -> Self {
    Self {
      session,
      should_quit: false,
    }
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }

  /// Interactive loop: one command per line, redraw when results arrive.
  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    println!("repolens: type 'help' for commands");
    println!("{}", render_screen(&self.session));

    while !self.should_quit {
      let Some(event) = events.next().await else {
        break;
      };
      match event {
        Event::Line(line) => {
          let output = self.handle_line(&line);
          if !output.is_empty() {
            println!("{}", output);
          }
        }
        Event::Tick => {
          if self.session.tick() {
            println!("{}", render_screen(&self.session));
          }
        }
        Event::Eof => break,
      }
    }

    info!("session ended");
    Ok(())
  }

  /// Settle the initial queries, print them and report the first error.
  pub async fn run_once(&mut self) -> Result<()> {
    self.session.settle().await;
    println!("{}", render_screen(&self.session));
    match self.session.first_error() {
      Some(e) => Err(eyre!("{}", e)),
      None => Ok(()),
    }
  }

  /// Handle one input line, returning the text to print.
  pub fn handle_line(&mut self, line: &str) -> String {
    if line.trim().is_empty() {
      return String::new();
    }
    match line.parse::<Input>() {
      Ok(input) => self.handle_input(input),
      Err(e) => e.to_string(),
    }
  }

  pub fn handle_input(&mut self, input: Input) -> String {
    debug!(?input, "input");
    let action = match input {
      Input::Search(text) => Action::SetSearchQuery(text),
      Input::Filter(update) => Action::SetFilter(update),
      Input::Filters(filters) => Action::SetFilters(filters),
      Input::Clear => Action::ClearFilters,
      Input::Page(page) => Action::SetPage(page),
      Input::Size(size) => Action::SetPageSize(size),
      Input::Close => Action::ClearSelected,
      Input::Select(selector) => match self.resolve_selection(selector) {
        Ok(action) => action,
        Err(message) => return message,
      },
      Input::Next => {
        if !self.session.next_page() {
          return "No next page.".to_string();
        }
        return render_screen(&self.session);
      }
      Input::Prev => {
        if !self.session.previous_page() {
          return "Already on the first page.".to_string();
        }
        return render_screen(&self.session);
      }
      Input::Retry => {
        if self.session.retry() == 0 {
          return "Nothing to retry.".to_string();
        }
        return render_screen(&self.session);
      }
      Input::Refresh => {
        self.session.refresh();
        return render_screen(&self.session);
      }
      Input::Status => return render_status(&self.session),
      Input::Help => return render_help(),
      Input::Quit => {
        self.should_quit = true;
        return String::new();
      }
    };

    self.session.dispatch(action);
    render_screen(&self.session)
  }

  fn resolve_selection(&self, selector: Selector) -> Result<Action, String> {
    match selector {
      Selector::Id(id) => Ok(Action::SetSelectedId(id)),
      Selector::Index(index) => self
        .session
        .search()
        .data()
        .and_then(|results| results.get(index - 1))
        .map(|repo| Action::SetSelectedId(repo.id))
        .ok_or_else(|| format!("No result #{} on this page.", index)),
    }
  }
}

/// Results, then details when a repository is selected.
pub fn render_screen(session: &Session) -> String {
  let state = session.state();
  let mut lines = render_results(session, &state);
  if state.selection.selected_id.is_some() {
    lines.push(String::new());
    lines.extend(render_selection(session));
  }
  lines.join("\n")
}

fn render_results(session: &Session, state: &AppState) -> Vec<String> {
  let search = session.search();
  let mut lines = Vec::new();

  match search.state() {
    QueryState::Idle => {
      lines.push("Type 'search <text>' to find repositories.".to_string());
      return lines;
    }
    QueryState::Loading => lines.push(format!("Searching '{}'...", search_label(state))),
    QueryState::Error(e) => {
      lines.push(format!("Search failed: {}", e.message));
      lines.push("Type 'retry' to try again.".to_string());
    }
    QueryState::Success(results) if results.is_empty() => {
      lines.push(format!("No repositories found for '{}'.", search_label(state)));
    }
    QueryState::Success(results) => {
      lines.push(format!("Results for '{}':", search_label(state)));
      for (i, repo) in results.iter().enumerate() {
        lines.push(format!("{:>3}. {}", i + 1, summary_line(repo)));
      }
    }
  }

  let mut footer = format!(
    "page {} ({} per page)",
    state.pagination.page, state.pagination.page_size
  );
  if session.has_previous_page() {
    footer.push_str("  [prev]");
  }
  if session.has_next_page() {
    footer.push_str("  [next]");
  }
  if search.is_fetching() && search.data().is_some() {
    footer.push_str("  refreshing...");
  }
  lines.push(footer);
  lines
}

fn search_label(state: &AppState) -> String {
  let filters = &state.criteria.filters;
  let mut label = state.criteria.query_text.trim().to_string();
  if !filters.language.is_empty() {
    label.push_str(&format!(" language:{}", filters.language));
  }
  if let Some(min_stars) = filters.min_stars {
    label.push_str(&format!(" stars>={}", min_stars));
  }
  if !filters.topics.is_empty() {
    label.push_str(&format!(" topics:{}", filters.topics));
  }
  label
}

fn summary_line(repo: &RepoSummary) -> String {
  let mut line = format!("{} [#{}] {} stars", repo.full_name, repo.id, repo.stars);
  if let Some(language) = &repo.primary_language {
    line.push_str(&format!(", {}", language));
  }
  if let Some(description) = &repo.description {
    line.push_str(&format!(": {}", description));
  }
  line
}

fn render_selection(session: &Session) -> Vec<String> {
  let mut lines = match session.detail().state() {
    QueryState::Idle => Vec::new(),
    QueryState::Loading => vec!["Loading details...".to_string()],
    QueryState::Error(e) => vec![format!("Details unavailable: {}", e.message)],
    QueryState::Success(detail) => detail_lines(detail),
  };

  match session.readme().state() {
    QueryState::Idle => {}
    QueryState::Loading => lines.push("Loading README...".to_string()),
    QueryState::Error(e) => lines.push(format!("README unavailable: {}", e.message)),
    QueryState::Success(readme) if readme.trim().is_empty() => {
      lines.push("No README.".to_string());
    }
    QueryState::Success(readme) => {
      lines.push("README:".to_string());
      let mut readme_lines = readme.lines();
      lines.extend(
        readme_lines
          .by_ref()
          .take(README_PREVIEW_LINES)
          .map(|l| format!("  {}", l)),
      );
      if readme_lines.next().is_some() {
        lines.push("  ...".to_string());
      }
    }
  }
  lines
}

fn detail_lines(detail: &RepoDetail) -> Vec<String> {
  let mut lines = vec![format!("{} [#{}]", detail.full_name, detail.id)];
  if let Some(description) = &detail.description {
    lines.push(format!("  {}", description));
  }
  lines.push(format!(
    "  stars {}  forks {}  watchers {}  open issues {}",
    detail.stars, detail.forks, detail.watchers, detail.open_issues
  ));

  let shares = detail.language_shares(LANGUAGE_LIMIT);
  if !shares.is_empty() {
    let languages: Vec<String> = shares
      .iter()
      .map(|s| format!("{} {:.1}%", s.language, s.percent))
      .collect();
    lines.push(format!("  languages: {}", languages.join(", ")));
  } else if let Some(language) = &detail.primary_language {
    lines.push(format!("  language: {}", language));
  }
  if !detail.topics.is_empty() {
    lines.push(format!("  topics: {}", detail.topics.join(", ")));
  }
  if let Some(pushed) = detail.pushed_at_github {
    lines.push(format!("  last push: {}", pushed.format("%Y-%m-%d")));
  }
  if let Some(url) = &detail.github_url {
    lines.push(format!("  {}", url));
  }
  lines
}

fn render_status(session: &Session) -> String {
  let state = session.state();
  let filters = &state.criteria.filters;
  let or_none = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

  let mut lines = vec![
    format!("query:     {}", or_none(state.criteria.query_text.trim())),
    format!("language:  {}", or_none(&filters.language)),
    format!(
      "min stars: {}",
      filters.min_stars.map_or("-".to_string(), |n| n.to_string())
    ),
    format!("topics:    {}", or_none(&filters.topics)),
    format!(
      "page:      {} ({} per page)",
      state.pagination.page, state.pagination.page_size
    ),
    format!(
      "selected:  {}",
      state.selection.selected_id.map_or("-".to_string(), |id| id.to_string())
    ),
    format!("cached:    {} entries", session.caches().len()),
  ];
  if let Some(e) = session.first_error() {
    lines.push(format!("error:     {}", e));
  }
  lines.join("\n")
}

fn render_help() -> String {
  let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
  COMMANDS
    .iter()
    .map(|c| {
      let aliases = if c.aliases.is_empty() {
        String::new()
      } else {
        format!(" ({})", c.aliases.join(", "))
      };
      format!("  {:<width$}  {}{}", c.usage, c.description, aliases, width = width)
    })
    .collect::<Vec<_>>()
    .join("\n")
}
