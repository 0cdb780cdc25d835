/// Replace every `{{key}}` in `template` with its value.
///
/// Placeholders without a value are left as-is. Substituted values are not
/// re-scanned, so a value containing `{{...}}` is inserted literally.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };

        let key = &after_open[..close];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => rendered.push_str(value),
            None => {
                rendered.push_str("{{");
                rendered.push_str(key);
                rendered.push_str("}}");
            }
        }
        rest = &after_open[close + 2..];
    }

    rendered.push_str(rest);
    rendered
}
