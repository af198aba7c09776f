use std::fmt::Write as _;

/// Index into [`Ast::entities`]. Entity identity is the index; two references
/// to the same alias always share one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A diagram participant. The alias keys identity; the display name may be
/// replaced by `declare "Name" as alias` without changing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub alias: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Call,
    Send,
    Respond,
}

impl MessageKind {
    /// Style-selector component for this message kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Send => "send",
            Self::Respond => "respond",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotePosition {
    Over,
    LeftOf,
    RightOf,
}

impl NotePosition {
    /// Style-selector component for this placement.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::LeftOf => "left",
            Self::RightOf => "right",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub operations: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AltBranch {
    pub condition: String,
    pub body: Sequence,
}

/// One diagram operation. The set is closed on purpose: the layout engine
/// matches exhaustively, so adding a variant is a compile error until every
/// pass handles it.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    DeclareEntity(EntityId),
    Message {
        src: EntityId,
        dst: EntityId,
        kind: MessageKind,
        text: String,
    },
    SetActivationState {
        entities: Vec<EntityId>,
        active: bool,
    },
    Destroy(EntityId),
    Loop {
        condition: String,
        body: Sequence,
    },
    Alt {
        branches: Vec<AltBranch>,
    },
    Opt {
        condition: String,
        body: Sequence,
    },
    Note {
        position: NotePosition,
        entity: EntityId,
        text: String,
    },
    Wait(u32),
}

/// A fully parsed diagram: the entity table (in first-mention order, which
/// fixes the left-to-right column order) and the top-level operation sequence.
/// The parser prepends one `DeclareEntity` per entity to the root sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub entities: Vec<Entity>,
    pub root: Sequence,
}

impl Ast {
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    /// Emits diagram source that parses back to a structurally equivalent
    /// AST. Respond messages are re-emitted in their lexical `dst<-src` form.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_sequence(&self.root, 0, &mut out);
        out
    }

    fn write_sequence(&self, seq: &Sequence, depth: usize, out: &mut String) {
        for op in &seq.operations {
            self.write_op(op, depth, out);
        }
    }

    fn write_op(&self, op: &Op, depth: usize, out: &mut String) {
        let pad = "    ".repeat(depth);
        match op {
            Op::DeclareEntity(id) => {
                let entity = self.entity(*id);
                if entity.name == entity.alias {
                    let _ = writeln!(out, "{pad}declare {}", entity.alias);
                } else {
                    let _ = writeln!(
                        out,
                        "{pad}declare {} as {}",
                        quote(&entity.name),
                        entity.alias
                    );
                }
            }
            Op::Message {
                src,
                dst,
                kind,
                text,
            } => {
                let line = match kind {
                    MessageKind::Call => {
                        format!("{}->{}", self.entity(*src).alias, self.entity(*dst).alias)
                    }
                    MessageKind::Send => {
                        format!("{}~>{}", self.entity(*src).alias, self.entity(*dst).alias)
                    }
                    // The parser swapped these; swap back so reparsing swaps again.
                    MessageKind::Respond => {
                        format!("{}<-{}", self.entity(*dst).alias, self.entity(*src).alias)
                    }
                };
                let _ = writeln!(out, "{pad}{line} {}", quote(text));
            }
            Op::SetActivationState { entities, active } => {
                let verb = if *active { "activate" } else { "deactivate" };
                let list = entities
                    .iter()
                    .map(|id| self.entity(*id).alias.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "{pad}{verb} {list}");
            }
            Op::Destroy(id) => {
                let _ = writeln!(out, "{pad}destroy {}", self.entity(*id).alias);
            }
            Op::Loop { condition, body } => {
                let _ = writeln!(out, "{pad}loop {} {{", quote(condition));
                self.write_sequence(body, depth + 1, out);
                let _ = writeln!(out, "{pad}}}");
            }
            Op::Alt { branches } => {
                for (idx, branch) in branches.iter().enumerate() {
                    if idx == 0 {
                        let _ = writeln!(out, "{pad}alt {} {{", quote(&branch.condition));
                    } else {
                        let _ = writeln!(out, "{pad}}} else {} {{", quote(&branch.condition));
                    }
                    self.write_sequence(&branch.body, depth + 1, out);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Op::Opt { condition, body } => {
                let _ = writeln!(out, "{pad}opt {} {{", quote(condition));
                self.write_sequence(body, depth + 1, out);
                let _ = writeln!(out, "{pad}}}");
            }
            Op::Note {
                position,
                entity,
                text,
            } => {
                let place = match position {
                    NotePosition::Over => "over".to_string(),
                    NotePosition::LeftOf => "left of".to_string(),
                    NotePosition::RightOf => "right of".to_string(),
                };
                let _ = writeln!(
                    out,
                    "{pad}note {place} {} {}",
                    self.entity(*entity).alias,
                    quote(text)
                );
            }
            Op::Wait(count) => {
                if *count == 1 {
                    let _ = writeln!(out, "{pad}wait");
                } else {
                    let _ = writeln!(out, "{pad}wait {count}");
                }
            }
        }
    }
}

fn quote(text: &str) -> String {
    let escaped = text
        .replace('"', "\\\"")
        .replace('\t', "\\t")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}
