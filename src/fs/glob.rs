//! Defines the glob pattern language of [`ScratchFs::glob`]:
//! `*`, `**`, `?`, `[set]` and `[!set]`.

use std::collections::{BTreeSet, HashSet};

use crate::error::{Error, Result};
use crate::fs::ScratchFs;
use crate::node::Node;
use crate::path;

/// One `/`-separated element of a compiled pattern.
enum Segment {
    /// `**` --- zero or more directory segments.
    Any,
    /// A name pattern matched against a single segment.
    Name(Vec<Token>),
}

enum Token {
    Literal(char),
    /// `?` --- exactly one character.
    AnyChar,
    /// `*` --- any run of characters within the segment.
    AnyRun,
    Class { negated: bool, entries: Vec<ClassEntry> },
}

enum ClassEntry {
    Single(char),
    Range(char, char),
}

struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern. Patterns not beginning with `/` are anchored
    /// to the root all the same.
    fn compile(raw: &str) -> Result<Pattern> {
        let mut segments = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => {}
                "**" => segments.push(Segment::Any),
                name => segments.push(Segment::Name(tokenize(name)?)),
            }
        }
        Ok(Pattern { segments })
    }
}

fn tokenize(segment: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = segment.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '?' => tokens.push(Token::AnyChar),
            '*' => tokens.push(Token::AnyRun),
            '[' => {
                let negated = chars.peek() == Some(&'!');
                if negated {
                    chars.next();
                }
                let mut entries = Vec::new();
                let mut closed = false;
                while let Some(member) = chars.next() {
                    if member == ']' && !entries.is_empty() {
                        closed = true;
                        break;
                    }
                    if chars.peek() == Some(&'-') {
                        let mut ahead = chars.clone();
                        ahead.next();
                        match ahead.peek() {
                            Some(&end) if end != ']' => {
                                chars.next();
                                chars.next();
                                entries.push(ClassEntry::Range(member, end));
                                continue;
                            }
                            _ => {}
                        }
                    }
                    entries.push(ClassEntry::Single(member));
                }
                if !closed {
                    return Err(Error::invalid_argument(format!(
                        "unterminated character class in pattern segment {segment:?}"
                    )));
                }
                tokens.push(Token::Class { negated, entries });
            }
            literal => tokens.push(Token::Literal(literal)),
        }
    }
    Ok(tokens)
}

fn class_matches(negated: bool, entries: &[ClassEntry], ch: char) -> bool {
    let hit = entries.iter().any(|entry| match entry {
        ClassEntry::Single(member) => *member == ch,
        ClassEntry::Range(low, high) => (*low..=*high).contains(&ch),
    });
    hit != negated
}

fn match_name(tokens: &[Token], name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    match_tokens(tokens, &chars)
}

fn match_tokens(tokens: &[Token], chars: &[char]) -> bool {
    match tokens.first() {
        None => chars.is_empty(),
        Some(Token::AnyRun) => {
            (0..=chars.len()).any(|taken| match_tokens(&tokens[1..], &chars[taken..]))
        }
        Some(Token::AnyChar) => !chars.is_empty() && match_tokens(&tokens[1..], &chars[1..]),
        Some(Token::Literal(literal)) => {
            chars.first() == Some(literal) && match_tokens(&tokens[1..], &chars[1..])
        }
        Some(Token::Class { negated, entries }) => chars
            .first()
            .is_some_and(|&ch| class_matches(*negated, entries, ch))
            && match_tokens(&tokens[1..], &chars[1..]),
    }
}

impl ScratchFs {
    /// Paths matching a glob pattern, sorted lexicographically.
    ///
    /// Recursive descent over the node tree with a per-level children
    /// snapshot; like every traversal the result is weakly consistent
    /// under concurrent mutation.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::compile(pattern)?;
        let total = pattern.segments.len();

        let mut matches = BTreeSet::new();
        let mut seen: HashSet<(String, usize)> = HashSet::new();
        let mut pending: Vec<(String, usize)> = vec![(String::from("/"), 0)];
        while let Some((dir_path, index)) = pending.pop() {
            if !seen.insert((dir_path.clone(), index)) {
                continue;
            }
            if index == total {
                matches.insert(dir_path);
                continue;
            }

            let children = {
                let tree = self.lock_tree();
                let Some(id) = tree.resolve(&dir_path) else { continue };
                let Node::Directory(dir) = tree.node(id) else { continue };
                dir.children
                    .iter()
                    .map(|(name, &child)| (name.clone(), tree.is_dir(child)))
                    .collect::<Vec<_>>()
            };

            match &pattern.segments[index] {
                Segment::Any => {
                    pending.push((dir_path.clone(), index + 1));
                    for (name, is_dir) in children {
                        if is_dir {
                            pending.push((path::join(&dir_path, &name), index));
                        }
                    }
                }
                Segment::Name(tokens) => {
                    let is_last = index + 1 == total;
                    for (name, is_dir) in children {
                        if !match_name(tokens, &name) {
                            continue;
                        }
                        let child_path = path::join(&dir_path, &name);
                        if is_last {
                            matches.insert(child_path);
                        } else if is_dir {
                            pending.push((child_path, index + 1));
                        }
                    }
                }
            }
        }
        Ok(matches.into_iter().collect())
    }
}
