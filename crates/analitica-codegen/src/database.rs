use crate::Context;

const TEMPLATE: &str = include_str!("../assets/database.py");

pub(crate) fn render(context: &Context<'_>) -> String {
    TEMPLATE.replace("__DATABASE_URL__", &context.config.database_url)
}
