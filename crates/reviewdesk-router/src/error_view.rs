use html_escape::{encode_double_quoted_attribute, encode_text};
use reviewdesk_schema::{Role, ViewContent};

/// Uniform failure view shown in place of a page that could not be mounted.
#[derive(Debug, Clone)]
pub struct ErrorPresenter {
    home_path: String,
}

impl ErrorPresenter {
    pub fn new(home_path: impl Into<String>) -> Self {
        Self {
            home_path: home_path.into(),
        }
    }

    /// Developers also get the message and the full cause chain.
    pub fn render(&self, error: &anyhow::Error, role: Option<Role>) -> ViewContent {
        let detail = if role.is_some_and(|r| r.is_privileged()) {
            format!(
                concat!(
                    "<details class=\"route-error-detail\" open>",
                    "<summary data-i18n=\"errors.details\">Details</summary>",
                    "<p class=\"route-error-message\">{message}</p>",
                    "<pre class=\"route-error-trace\">{trace}</pre>",
                    "</details>"
                ),
                message = encode_text(&error.to_string()),
                trace = encode_text(&format!("{error:?}")),
            )
        } else {
            String::new()
        };

        let markup = format!(
            concat!(
                "<section class=\"route-error\" role=\"alert\">",
                "<h2 data-i18n=\"errors.page_load_title\">Something went wrong</h2>",
                "<p data-i18n=\"errors.page_load_message\">This page could not be loaded. ",
                "Try again or return to the dashboard.</p>",
                "{detail}",
                "<div class=\"route-error-actions\">",
                "<button type=\"button\" data-action=\"reload\" data-i18n=\"errors.retry\">Retry</button>",
                "<a href=\"#{home}\" data-action=\"home\" data-i18n=\"errors.back_to_dashboard\">",
                "Return to dashboard</a>",
                "</div>",
                "</section>"
            ),
            detail = detail,
            home = encode_double_quoted_attribute(&self.home_path),
        );
        ViewContent::new(markup)
    }
}

impl Default for ErrorPresenter {
    fn default() -> Self {
        Self::new("/dashboard")
    }
}
