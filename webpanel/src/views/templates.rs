//! HTML templates embedded into the binary and rendered with minijinja.

use std::collections::BTreeMap;

use minijinja::{Environment, Value, context};
use once_cell::sync::Lazy;
use rust_embed::RustEmbed;

use super::ROUTES;

#[derive(RustEmbed)]
#[folder = "templates/"]
pub struct Templates;

static ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.set_loader(|name| {
        Ok(Templates::get(name).map(|file| String::from_utf8_lossy(&file.data).into_owned()))
    });

    // Paths are static and must not be HTML-escaped inside attributes
    let routes: BTreeMap<&str, Value> = ROUTES
        .iter()
        .map(|(endpoint, path)| (*endpoint, Value::from_safe_string(path.to_string())))
        .collect();
    env.add_global("routes", Value::from(routes));
    env
});

/// Render template `name` with `ctx`. Every template also sees the `routes` map.
pub fn render(name: &str, ctx: Value) -> Result<String, minijinja::Error> {
    ENV.get_template(name)?.render(ctx)
}

pub fn render_error(title: &str, message: &str) -> Result<String, minijinja::Error> {
    render("error.html", context! { error => title, message => message })
}
