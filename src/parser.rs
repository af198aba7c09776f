use indexmap::IndexMap;

use crate::ast::{AltBranch, Ast, Entity, EntityId, MessageKind, NotePosition, Op, Sequence};
use crate::error::{Error, ParseError, Result};
use crate::lexer::{Keyword, Token, TokenKind, tokenize};

/// Parses diagram source into an [`Ast`]. Entity aliases are resolved through
/// a registry scoped to the whole parse, so every reference to an alias shares
/// one entity record; one `DeclareEntity` per distinct entity is prepended to
/// the root sequence in first-mention order.
pub fn parse(source: &str) -> Result<Ast> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        entities: Vec::new(),
        registry: IndexMap::new(),
    };
    parser.diagram()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    entities: Vec<Entity>,
    registry: IndexMap<String, EntityId>,
}

impl Parser<'_> {
    fn diagram(&mut self) -> Result<Ast> {
        let mut operations = Vec::new();
        let mut statements = 0usize;
        while self.pos < self.tokens.len() {
            if let Some(op) = self.statement()? {
                operations.push(op);
            }
            statements += 1;
        }
        if statements < 2 {
            return Err(self.error_here("a diagram needs at least two statements"));
        }

        let mut root = Sequence { operations };
        for (idx, id) in self.registry.values().enumerate() {
            root.operations.insert(idx, Op::DeclareEntity(*id));
        }
        Ok(Ast {
            entities: std::mem::take(&mut self.entities),
            root,
        })
    }

    /// `declare` statements register entities but emit no operation.
    fn statement(&mut self) -> Result<Option<Op>> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Entity(_)) => self.message().map(Some),
            Some(TokenKind::Keyword(kw)) => match kw {
                Keyword::Activate => self.activation(true).map(Some),
                Keyword::Deactivate => self.activation(false).map(Some),
                Keyword::Destroy => {
                    self.advance();
                    let entity = self.entity_ref()?;
                    Ok(Some(Op::Destroy(entity)))
                }
                Keyword::Note => self.note().map(Some),
                Keyword::Declare => {
                    self.declare()?;
                    Ok(None)
                }
                Keyword::Wait => self.wait().map(Some),
                Keyword::Loop => self.loop_block().map(Some),
                Keyword::Opt => self.opt_block().map(Some),
                Keyword::Alt => self.alt_block().map(Some),
                _ => Err(self.error_here("expected a statement")),
            },
            _ => Err(self.error_here("expected a statement")),
        }
    }

    fn message(&mut self) -> Result<Op> {
        let lhs = self.entity_ref()?;
        let kind = match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::MessageType(kind)) => {
                self.advance();
                kind
            }
            _ => return Err(self.error_here("expected a message operator after entity")),
        };
        let rhs = self.entity_ref()?;
        let text = self.string()?;

        // `B<-A "x"` reads "A responds to B": the message travels from A to B,
        // so source and destination swap from their lexical order.
        let (src, dst) = match kind {
            MessageKind::Respond => (rhs, lhs),
            _ => (lhs, rhs),
        };
        Ok(Op::Message {
            src,
            dst,
            kind,
            text,
        })
    }

    fn activation(&mut self, active: bool) -> Result<Op> {
        self.advance();
        let mut entities = vec![self.entity_ref()?];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
            self.advance();
            entities.push(self.entity_ref()?);
        }
        Ok(Op::SetActivationState { entities, active })
    }

    fn note(&mut self) -> Result<Op> {
        self.advance();
        let position = match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Keyword(Keyword::Over)) => {
                self.advance();
                NotePosition::Over
            }
            Some(TokenKind::Keyword(Keyword::Left)) => {
                self.advance();
                self.expect_keyword(Keyword::Of)?;
                NotePosition::LeftOf
            }
            Some(TokenKind::Keyword(Keyword::Right)) => {
                self.advance();
                self.expect_keyword(Keyword::Of)?;
                NotePosition::RightOf
            }
            _ => return Err(self.error_here("expected 'over', 'left of' or 'right of'")),
        };
        let entity = self.entity_ref()?;
        let text = self.string()?;
        Ok(Op::Note {
            position,
            entity,
            text,
        })
    }

    fn declare(&mut self) -> Result<()> {
        self.advance();
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Entity(alias)) => {
                self.advance();
                self.get_entity(&alias);
                Ok(())
            }
            Some(TokenKind::Str(name)) => {
                self.advance();
                self.expect_keyword(Keyword::As)?;
                let alias = match self.peek().map(|t| t.kind.clone()) {
                    Some(TokenKind::Entity(alias)) => {
                        self.advance();
                        alias
                    }
                    _ => return Err(self.error_here("expected an alias after 'as'")),
                };
                let id = self.get_entity(&alias);
                self.entities[id.index()].name = name;
                Ok(())
            }
            _ => Err(self.error_here("expected an entity or a display name after 'declare'")),
        }
    }

    fn wait(&mut self) -> Result<Op> {
        self.advance();
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Number(count)) => {
                self.advance();
                if count < 1 {
                    return Err(Error::InvalidOperand(
                        "wait count must be at least one beat".to_string(),
                    ));
                }
                Ok(Op::Wait(count))
            }
            _ => Ok(Op::Wait(1)),
        }
    }

    fn loop_block(&mut self) -> Result<Op> {
        self.advance();
        let condition = match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Str(text)) => {
                self.advance();
                text
            }
            Some(TokenKind::Number(count)) => {
                self.advance();
                count.to_string()
            }
            _ => return Err(self.error_here("expected a loop condition")),
        };
        let body = self.block()?;
        Ok(Op::Loop { condition, body })
    }

    fn opt_block(&mut self) -> Result<Op> {
        self.advance();
        let condition = self.string()?;
        let body = self.block()?;
        Ok(Op::Opt { condition, body })
    }

    fn alt_block(&mut self) -> Result<Op> {
        self.advance();
        let condition = self.string()?;
        let body = self.block()?;
        let mut branches = vec![AltBranch { condition, body }];
        while matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Keyword(Keyword::Else))
        ) {
            self.advance();
            let condition = self.string()?;
            let body = self.block()?;
            branches.push(AltBranch { condition, body });
        }
        Ok(Op::Alt { branches })
    }

    fn block(&mut self) -> Result<Sequence> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::BlockOpen) => self.advance(),
            _ => return Err(self.error_here("expected '{'")),
        }
        let mut operations = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::BlockClose) => {
                    self.advance();
                    return Ok(Sequence { operations });
                }
                Some(_) => {
                    if let Some(op) = self.statement()? {
                        operations.push(op);
                    }
                }
                None => return Err(self.error_here("expected '}'")),
            }
        }
    }

    fn entity_ref(&mut self) -> Result<EntityId> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Entity(alias)) => {
                self.advance();
                Ok(self.get_entity(&alias))
            }
            _ => Err(self.error_here("expected an entity")),
        }
    }

    fn string(&mut self) -> Result<String> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Str(text)) => {
                self.advance();
                Ok(text)
            }
            _ => Err(self.error_here("expected a quoted string")),
        }
    }

    fn get_entity(&mut self, alias: &str) -> EntityId {
        if let Some(id) = self.registry.get(alias) {
            return *id;
        }
        let id = EntityId(self.entities.len());
        self.entities.push(Entity {
            alias: alias.to_string(),
            name: alias.to_string(),
        });
        self.registry.insert(alias.to_string(), id);
        id
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Keyword(kw)) if *kw == keyword => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error_here("unexpected token")),
        }
    }

    fn error_here(&self, message: &str) -> Error {
        let (token, line, column) = match self.peek().or_else(|| self.tokens.last()) {
            Some(tok) => (format!("{:?}", tok.lexeme), tok.line, tok.column),
            None => ("end of input".to_string(), 1, 1),
        };
        let source_line = self
            .source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or("")
            .to_string();
        Error::Parse(ParseError {
            message: message.to_string(),
            token,
            line,
            column,
            source_line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_precede_operations_in_first_mention_order() {
        let ast = parse("declare X\ndeclare Y\nX->Y \"Hi\"").unwrap();
        assert_eq!(ast.entities.len(), 2);
        assert_eq!(ast.entities[0].alias, "X");
        assert_eq!(ast.entities[1].alias, "Y");
        assert_eq!(ast.root.operations.len(), 3);
        assert_eq!(ast.root.operations[0], Op::DeclareEntity(EntityId(0)));
        assert_eq!(ast.root.operations[1], Op::DeclareEntity(EntityId(1)));
        assert_eq!(
            ast.root.operations[2],
            Op::Message {
                src: EntityId(0),
                dst: EntityId(1),
                kind: MessageKind::Call,
                text: "Hi".into(),
            }
        );
    }

    #[test]
    fn respond_swaps_source_and_destination() {
        let ast = parse("B<-A \"x\"\nwait").unwrap();
        // Lexically B then A, so B is entity 0; the message travels A -> B.
        let b = EntityId(0);
        let a = EntityId(1);
        assert_eq!(
            ast.root.operations[2],
            Op::Message {
                src: a,
                dst: b,
                kind: MessageKind::Respond,
                text: "x".into(),
            }
        );
    }

    #[test]
    fn declare_as_renames_but_keeps_identity() {
        let ast = parse("a->b \"hi\"\ndeclare \"Auth Service\" as a").unwrap();
        assert_eq!(ast.entities[0].alias, "a");
        assert_eq!(ast.entities[0].name, "Auth Service");
        assert_eq!(ast.entities.len(), 2);
    }

    #[test]
    fn activation_lists_parse() {
        let ast = parse("activate a, b, c\ndeactivate a").unwrap();
        assert_eq!(
            ast.root.operations[3],
            Op::SetActivationState {
                entities: vec![EntityId(0), EntityId(1), EntityId(2)],
                active: true,
            }
        );
    }

    #[test]
    fn alt_collects_else_branches() {
        let ast = parse("alt \"c1\" { a->b \"x\" } else \"c2\" { }\nwait").unwrap();
        let alt = &ast.root.operations[2];
        match alt {
            Op::Alt { branches } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].condition, "c1");
                assert_eq!(branches[0].body.operations.len(), 1);
                assert_eq!(branches[1].condition, "c2");
                assert!(branches[1].body.operations.is_empty());
            }
            other => panic!("expected alt, got {other:?}"),
        }
    }

    #[test]
    fn loop_accepts_numeric_condition() {
        let ast = parse("loop 3 { a->b \"x\" }\nwait").unwrap();
        match &ast.root.operations[2] {
            Op::Loop { condition, .. } => assert_eq!(condition, "3"),
            other => panic!("expected loop, got {other:?}"),
        }
    }

    #[test]
    fn note_placements_parse() {
        let ast =
            parse("note over a \"n1\"\nnote left of a \"n2\"\nnote right of a \"n3\"").unwrap();
        let positions: Vec<_> = ast
            .root
            .operations
            .iter()
            .filter_map(|op| match op {
                Op::Note { position, .. } => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(
            positions,
            vec![
                NotePosition::Over,
                NotePosition::LeftOf,
                NotePosition::RightOf
            ]
        );
    }

    #[test]
    fn missing_destination_is_a_parse_error() {
        let err = parse("X -> \"no destination\"\nwait").unwrap_err();
        match err {
            Error::Parse(parse) => {
                assert_eq!(parse.line, 1);
                assert!(parse.source_line.contains("no destination"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn single_statement_is_rejected() {
        assert!(matches!(parse("a->b \"x\""), Err(Error::Parse(_))));
    }

    #[test]
    fn wait_zero_is_invalid() {
        assert!(matches!(
            parse("wait 0\nwait"),
            Err(Error::InvalidOperand(_))
        ));
    }

    #[test]
    fn pretty_printed_ast_reparses_identically() {
        let source = r#"
declare "Gateway" as g
declare d
g->d "C"
activate g, d
note right of d "careful"
alt "ok" {
    g->d "yes"
    g<-d "ack"
} else "fail" {
    g~>d "retry"
}
loop "3 times" {
    wait 2
    opt "maybe" { d->d "tick" }
}
deactivate g
destroy d
"#;
        let ast = parse(source).unwrap();
        let printed = ast.to_source();
        let reparsed = parse(&printed).unwrap();
        assert_eq!(ast, reparsed);
    }
}
