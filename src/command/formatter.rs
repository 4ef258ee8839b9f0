use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("malformed template {template:?} at byte {position}: {reason}")]
    MalformedTemplate { template: String, position: usize, reason: String },
    #[error("template {template:?} references {placeholder}, but no such argument was supplied")]
    MissingArgument { template: String, placeholder: String },
    #[error("argument {argument} is never referenced by template {template:?}")]
    UnusedArgument { template: String, argument: String },
}

/// Renders command templates such as `listFiles {0}` into the command line the OBC terminal
/// parses.
///
/// Placeholders are `{}` (next positional argument), `{N}` (positional argument N) or
/// `{name}` (keyword argument). `{{` and `}}` produce literal braces. Arguments are inserted
/// through their [`Display`] implementation and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFormatter {
    strict: bool,
}

impl Default for CommandFormatter {
    fn default() -> Self {
        CommandFormatter { strict: true }
    }
}

enum Numbering {
    Unknown,
    Automatic(usize),
    Manual,
}

impl CommandFormatter {
    /// Strict formatters reject arguments that the template never references
    pub fn new(strict: bool) -> Self {
        CommandFormatter { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn format(
        &self,
        template: &str,
        positional: &[&dyn Display],
        keyword: &[(&str, &dyn Display)],
    ) -> Result<String, FormatError> {
        let malformed = |position: usize, reason: &str| FormatError::MalformedTemplate {
            template: template.to_string(),
            position,
            reason: reason.to_string(),
        };

        let mut output = String::with_capacity(template.len());
        let mut used_positional = vec![false; positional.len()];
        let mut used_keyword = vec![false; keyword.len()];
        let mut numbering = Numbering::Unknown;

        let mut chars = template.char_indices().peekable();
        while let Some((position, c)) = chars.next() {
            match c {
                '{' if chars.next_if(|&(_, c)| c == '{').is_some() => output.push('{'),
                '}' if chars.next_if(|&(_, c)| c == '}').is_some() => output.push('}'),
                '}' => return Err(malformed(position, "unmatched '}'")),
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, '{')) | None => {
                                return Err(malformed(position, "unterminated placeholder"))
                            }
                            Some((_, c)) => name.push(c),
                        }
                    }

                    let value = if name.is_empty() {
                        let index = match numbering {
                            Numbering::Unknown => 0,
                            Numbering::Automatic(next) => next,
                            Numbering::Manual => {
                                return Err(malformed(position, "mixes {} with numbered placeholders"))
                            }
                        };
                        numbering = Numbering::Automatic(index + 1);
                        lookup_positional(positional, &mut used_positional, index)
                    } else if name.bytes().all(|b| b.is_ascii_digit()) {
                        if matches!(numbering, Numbering::Automatic(_)) {
                            return Err(malformed(position, "mixes {} with numbered placeholders"));
                        }
                        numbering = Numbering::Manual;
                        let index = name.parse::<usize>().map_err(|_| malformed(position, "index out of range"))?;
                        lookup_positional(positional, &mut used_positional, index)
                    } else if is_identifier(&name) {
                        keyword.iter().position(|(key, _)| *key == name).map(|index| {
                            used_keyword[index] = true;
                            keyword[index].1
                        })
                    } else {
                        return Err(malformed(position, "placeholder is neither an index nor a name"));
                    };

                    let Some(value) = value else {
                        return Err(FormatError::MissingArgument {
                            template: template.to_string(),
                            placeholder: format!("{{{name}}}"),
                        });
                    };
                    output.push_str(&value.to_string());
                }
                c => output.push(c),
            }
        }

        if self.strict {
            if let Some(index) = used_positional.iter().position(|used| !used) {
                return Err(FormatError::UnusedArgument {
                    template: template.to_string(),
                    argument: index.to_string(),
                });
            }
            if let Some(index) = used_keyword.iter().position(|used| !used) {
                return Err(FormatError::UnusedArgument {
                    template: template.to_string(),
                    argument: keyword[index].0.to_string(),
                });
            }
        }

        Ok(output)
    }
}

fn lookup_positional<'a>(
    positional: &[&'a dyn Display],
    used: &mut [bool],
    index: usize,
) -> Option<&'a dyn Display> {
    let value = positional.get(index)?;
    used[index] = true;
    Some(*value)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}
