use contextlink_api::{Model, Provider};

/// Terminal colour used to tint a provider badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Green,
    Amber,
    Blue,
    Neutral,
}

impl Tint {
    pub fn ansi_code(&self) -> &'static str {
        match self {
            Self::Green => "\x1b[32m",
            Self::Amber => "\x1b[33m",
            Self::Blue => "\x1b[34m",
            Self::Neutral => "\x1b[37m",
        }
    }
}

/// Icon and tint shown next to a provider's models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStyle {
    pub icon: &'static str,
    pub tint: Tint,
}

/// Badge for providers without a dedicated style.
pub const DEFAULT_PROVIDER_STYLE: ProviderStyle = ProviderStyle {
    icon: "⚡",
    tint: Tint::Neutral,
};

const ANSI_RESET: &str = "\x1b[0m";

/// Total mapping from provider to badge; unrecognised providers get the default.
pub fn provider_style(provider: Provider) -> ProviderStyle {
    match provider {
        Provider::OpenAi => ProviderStyle {
            icon: "🤖",
            tint: Tint::Green,
        },
        Provider::Anthropic => ProviderStyle {
            icon: "🧠",
            tint: Tint::Amber,
        },
        Provider::Google => ProviderStyle {
            icon: "🔍",
            tint: Tint::Blue,
        },
        Provider::Other | Provider::Unknown => DEFAULT_PROVIDER_STYLE,
    }
}

/// Controlled model list: holds the catalog and the current value, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelector {
    current_model: String,
    available_models: Vec<Model>,
}

impl ModelSelector {
    /// Selector over `available_models` with `current_model` highlighted.
    pub fn new(current_model: impl Into<String>, available_models: Vec<Model>) -> Self {
        Self {
            current_model: current_model.into(),
            available_models,
        }
    }

    pub fn current_model(&self) -> &str {
        &self.current_model
    }

    pub fn available_models(&self) -> &[Model] {
        &self.available_models
    }

    /// Resolves a selection typed as either a catalog name or a 1-based index.
    ///
    /// Anything else is passed through unchanged; the select is free text.
    pub fn resolve(&self, input: &str) -> String {
        let input = input.trim();
        input
            .parse::<usize>()
            .ok()
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.available_models.get(index))
            .map(|model| model.name.clone())
            .unwrap_or_else(|| input.to_string())
    }

    /// Whether `model_name` is in the loaded catalog.
    pub fn is_known(&self, model_name: &str) -> bool {
        self.available_models
            .iter()
            .any(|model| model.name == model_name)
    }

    /// Numbered catalog with the current model starred; `colored` tints the badges.
    pub fn render(&self, colored: bool) -> String {
        if self.available_models.is_empty() {
            return format!("No models available. Current: {}", self.current_model);
        }

        self.available_models
            .iter()
            .enumerate()
            .map(|(index, model)| {
                let style = provider_style(model.info.provider);
                let marker = if model.name == self.current_model {
                    '*'
                } else {
                    ' '
                };
                let badge = if colored {
                    format!("{}{}{ANSI_RESET}", style.tint.ansi_code(), style.icon)
                } else {
                    style.icon.to_string()
                };
                format!(
                    "{marker} {:>2}. {badge} {:<20} {:<10} {} tokens",
                    index + 1,
                    model.name,
                    model.info.provider.as_str(),
                    model.info.max_tokens,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
