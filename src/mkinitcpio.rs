use std::fmt;

/// The `HOOKS=` line of `/etc/mkinitcpio.conf`, editable in place.
#[derive(Debug, Clone)]
pub struct MkinitcpioConfig {
    original_content: String,
    hooks: Vec<String>,
    hooks_line_idx: Option<usize>,
    quote_char: Option<char>,
}

impl MkinitcpioConfig {
    pub fn parse(content: &str) -> Self {
        let mut hooks = Vec::new();
        let mut hooks_line_idx = None;
        let mut quote_char = None;

        for (idx, line) in content.lines().enumerate() {
            if !line.trim().starts_with("HOOKS=") {
                continue;
            }
            hooks_line_idx = Some(idx);

            // HOOKS=(...) on Arch, HOOKS="..." on older configs
            let open = line.char_indices().find(|(_, c)| matches!(c, '(' | '"' | '\''));
            if let Some((start, open_char)) = open {
                let close_char = if open_char == '(' { ')' } else { open_char };
                if let Some(end) = line.rfind(close_char)
                    && end > start
                {
                    hooks = line[start + 1..end]
                        .split_whitespace()
                        .map(String::from)
                        .collect();
                    if open_char != '(' {
                        quote_char = Some(open_char);
                    }
                }
            }
            break;
        }

        Self {
            original_content: content.to_string(),
            hooks,
            hooks_line_idx,
            quote_char,
        }
    }

    pub fn hooks(&self) -> &[String] {
        &self.hooks
    }

    pub fn contains_hook(&self, hook: &str) -> bool {
        self.hooks.iter().any(|h| h == hook)
    }

    pub fn remove_hook(&mut self, hook: &str) {
        self.hooks.retain(|h| h != hook);
    }

    /// Place `hook` right after `after`, or at the end when `after` is missing.
    pub fn insert_after(&mut self, hook: &str, after: &str) {
        if self.contains_hook(hook) {
            self.remove_hook(hook);
        }

        if let Some(idx) = self.hooks.iter().position(|h| h == after) {
            self.hooks.insert(idx + 1, hook.to_string());
        } else {
            self.hooks.push(hook.to_string());
        }
    }
}

impl fmt::Display for MkinitcpioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self.original_content.lines().map(String::from).collect();
        let hooks_str = self.hooks.join(" ");

        let new_line = match self.quote_char {
            Some(quote) => format!("HOOKS={}{}{}", quote, hooks_str, quote),
            None => format!("HOOKS=({})", hooks_str),
        };

        match self.hooks_line_idx {
            Some(idx) => lines[idx] = new_line,
            None => lines.push(new_line),
        }

        write!(f, "{}", lines.join("\n"))?;
        if self.original_content.ends_with('\n') || self.hooks_line_idx.is_none() {
            writeln!(f)?;
        }
        Ok(())
    }
}
