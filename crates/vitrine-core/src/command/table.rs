//! Ordered command table.
//!
//! Routes are evaluated top to bottom and the first match wins. Prefixes
//! overlap (`@compra` and the generic `@` fallback, for instance), so the
//! order is part of the data and tests assert it directly.

use super::handler::BoxCommandHandler;
use super::normalize::NormalizedText;

/// How a route recognizes its command. Matching is done on lower-cased text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// The whole text equals the literal.
    Exact(String),
    /// The text starts with any of the literals.
    Prefix(Vec<String>),
    /// The whole text equals one of the literals.
    OneOf(Vec<String>),
}

impl Matcher {
    pub fn exact(literal: &str) -> Self {
        Matcher::Exact(literal.to_lowercase())
    }

    pub fn prefix(literals: &[&str]) -> Self {
        Matcher::Prefix(literals.iter().map(|l| l.to_lowercase()).collect())
    }

    pub fn one_of(literals: &[&str]) -> Self {
        Matcher::OneOf(literals.iter().map(|l| l.to_lowercase()).collect())
    }

    pub fn matches(&self, lowered: &str) -> bool {
        match self {
            Matcher::Exact(literal) => lowered == literal,
            Matcher::Prefix(literals) => literals.iter().any(|l| lowered.starts_with(l.as_str())),
            Matcher::OneOf(literals) => literals.iter().any(|l| lowered == l),
        }
    }
}

/// Whether a command may run before its group is warmed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandWeight {
    /// Text-only replies; runs even when the group is not ready.
    Lightweight,
    /// May send media or mass mentions; skipped until the group is ready.
    Heavy,
}

/// One row of the table.
#[derive(Debug, Clone)]
pub struct CommandRoute {
    pub name: String,
    pub matcher: Matcher,
    pub weight: CommandWeight,
    /// Only considered in group conversations.
    pub group_only: bool,
    pub handler: BoxCommandHandler,
}

/// First-match-wins list of routes.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    routes: Vec<CommandRoute>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route at the lowest priority.
    pub fn push(&mut self, route: CommandRoute) {
        self.routes.push(route);
    }

    pub fn with_route(mut self, route: CommandRoute) -> Self {
        self.push(route);
        self
    }

    /// The first route matching `text`.
    ///
    /// Group-only routes are passed over outside groups, so a later route
    /// (typically the generic fallback) can still match.
    pub fn find(&self, text: &NormalizedText, is_group: bool) -> Option<&CommandRoute> {
        self.routes
            .iter()
            .filter(|route| is_group || !route.group_only)
            .find(|route| route.matcher.matches(&text.lowered))
    }

    /// Route names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The storefront's command surface, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorefrontCommand {
    Compra2,
    Concorrentes,
    Remove,
    Ban,
    Pagamentos,
    Grupo,
    Compra,
    Concorrencia,
    Tabela,
    Todos,
    Fallback,
    Shortcut,
}

impl StorefrontCommand {
    /// Evaluation order. More specific `@` commands precede the fallback.
    pub const ORDERED: [StorefrontCommand; 12] = [
        StorefrontCommand::Compra2,
        StorefrontCommand::Concorrentes,
        StorefrontCommand::Remove,
        StorefrontCommand::Ban,
        StorefrontCommand::Pagamentos,
        StorefrontCommand::Grupo,
        StorefrontCommand::Compra,
        StorefrontCommand::Concorrencia,
        StorefrontCommand::Tabela,
        StorefrontCommand::Todos,
        StorefrontCommand::Fallback,
        StorefrontCommand::Shortcut,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StorefrontCommand::Compra2 => "compra2",
            StorefrontCommand::Concorrentes => "concorrentes",
            StorefrontCommand::Remove => "remove",
            StorefrontCommand::Ban => "ban",
            StorefrontCommand::Pagamentos => "pagamentos",
            StorefrontCommand::Grupo => "grupo",
            StorefrontCommand::Compra => "compra",
            StorefrontCommand::Concorrencia => "concorrencia",
            StorefrontCommand::Tabela => "tabela",
            StorefrontCommand::Todos => "todos",
            StorefrontCommand::Fallback => "fallback",
            StorefrontCommand::Shortcut => "shortcut",
        }
    }

    pub fn matcher(self) -> Matcher {
        match self {
            StorefrontCommand::Compra2 => Matcher::prefix(&[".compra"]),
            StorefrontCommand::Concorrentes => Matcher::exact("@concorrentes"),
            StorefrontCommand::Remove => Matcher::prefix(&["@remove", "/remove"]),
            StorefrontCommand::Ban => Matcher::prefix(&["@ban", "/ban"]),
            StorefrontCommand::Pagamentos => Matcher::exact("@pagamentos"),
            StorefrontCommand::Grupo => Matcher::one_of(&["@grupo on", "@grupo off"]),
            StorefrontCommand::Compra => Matcher::prefix(&["@compra", "@rentanas"]),
            StorefrontCommand::Concorrencia => Matcher::exact("@concorrencia"),
            StorefrontCommand::Tabela => Matcher::exact("@tabela"),
            StorefrontCommand::Todos => Matcher::exact("@todos"),
            StorefrontCommand::Fallback => Matcher::prefix(&["@", "/"]),
            StorefrontCommand::Shortcut => Matcher::one_of(&[".n", ".t", ".i", ".s"]),
        }
    }

    pub fn weight(self) -> CommandWeight {
        match self {
            StorefrontCommand::Compra2
            | StorefrontCommand::Compra
            | StorefrontCommand::Concorrencia
            | StorefrontCommand::Tabela
            | StorefrontCommand::Todos => CommandWeight::Heavy,
            _ => CommandWeight::Lightweight,
        }
    }

    pub fn group_only(self) -> bool {
        matches!(self, StorefrontCommand::Concorrencia)
    }

    /// Build the full route for this command.
    pub fn route(self, handler: BoxCommandHandler) -> CommandRoute {
        CommandRoute {
            name: self.name().to_string(),
            matcher: self.matcher(),
            weight: self.weight(),
            group_only: self.group_only(),
            handler,
        }
    }
}

/// Build the storefront table, asking `handler_for` for each command's
/// handler in priority order.
pub fn storefront_table(
    mut handler_for: impl FnMut(StorefrontCommand) -> BoxCommandHandler,
) -> CommandTable {
    StorefrontCommand::ORDERED
        .into_iter()
        .fold(CommandTable::new(), |table, command| {
            table.with_route(command.route(handler_for(command)))
        })
}
