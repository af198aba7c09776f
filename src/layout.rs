//! Layout and compile engine.
//!
//! One forward walk over the AST threads a monotonically increasing vertical
//! cursor, per-entity horizontal constraints, and activation state, recording
//! deferred layer records as it goes. Entity x-positions are only stable once
//! the walk finishes, so records snapshot everything except positions; a
//! final lowering step resolves positions and produces concrete
//! [`DrawCommand`]s in the fixed paint order.

use indexmap::IndexMap;

use crate::ast::{AltBranch, Ast, EntityId, MessageKind, NotePosition, Op, Sequence};
use crate::command::{ArrowheadKind, Compiled, Direction, DrawCommand, Layers};
use crate::error::Result;
use crate::style::{DASH_PATTERN, StyleSheet};
use crate::text_metrics::TextShaper;

const PAGE: &[&str] = &["page"];
const ENTITY: &[&str] = &["entity"];
const LIFELINE: &[&str] = &["lifeline"];
const ACTIVITY_BOX: &[&str] = &["activity-box"];
const DESTROY: &[&str] = &["destroy"];
const BLOCK_LOOP: &[&str] = &["block", "loop"];
const BLOCK_OPT: &[&str] = &["block", "opt"];
const BLOCK_ALT: &[&str] = &["block", "alt"];

fn note_prefix(position: NotePosition) -> &'static [&'static str] {
    match position {
        NotePosition::Over => &["note", "over"],
        NotePosition::LeftOf => &["note", "left"],
        NotePosition::RightOf => &["note", "right"],
    }
}

/// Compiles a parsed diagram against a style sheet and a text shaper,
/// producing the canvas size and layered drawing commands.
pub fn compile(ast: &Ast, style: &StyleSheet, shaper: &dyn TextShaper) -> Result<Compiled> {
    let mut compiler = Compiler {
        ast,
        style,
        shaper,
        entities: IndexMap::new(),
        cursor: 0.0,
        extra_right_padding: 0.0,
        total_width: 0.0,
        backgrounds: Vec::new(),
        content: Vec::new(),
        frame: Vec::new(),
    };
    compiler.cursor = compiler.header_height()?;
    compiler.walk(&ast.root)?;
    compiler.finish()
}

/// Activation intervals are `[start, end)` in canvas y; `None` means still
/// open and extends to the diagram bottom at lowering time.
struct EntityState {
    constraint: (Option<EntityId>, f32),
    active: bool,
    activity: Vec<(f32, Option<f32>)>,
}

/// A drawing deferred until entity positions are final. Everything except
/// positions is snapshotted at record time, activation flags included.
enum Record {
    Message {
        src: EntityId,
        dst: EntityId,
        kind: MessageKind,
        text: String,
        top: f32,
        src_active: bool,
        dst_active: bool,
    },
    Note {
        entity: EntityId,
        position: NotePosition,
        text: String,
        top: f32,
    },
    DestroyCross {
        entity: EntityId,
        top: f32,
    },
    BlockBackground {
        top: f32,
        bottom: f32,
        prefix: &'static [&'static str],
    },
    BlockFrame {
        top: f32,
        bottom: f32,
        title: &'static str,
        label: String,
        prefix: &'static [&'static str],
    },
    Separator {
        y: f32,
        label: String,
        prefix: &'static [&'static str],
    },
}

struct Compiler<'a> {
    ast: &'a Ast,
    style: &'a StyleSheet,
    shaper: &'a dyn TextShaper,
    entities: IndexMap<EntityId, EntityState>,
    cursor: f32,
    extra_right_padding: f32,
    total_width: f32,
    backgrounds: Vec<Record>,
    content: Vec<Record>,
    frame: Vec<Record>,
}

impl Compiler<'_> {
    // ----- measurement -----

    /// Width of the widest line, height of all lines stacked with line
    /// spacing between them. Empty text is (0, 0).
    fn text_size(&self, text: &str, prefix: &[&str]) -> Result<(f32, f32)> {
        let font = self.style.font(prefix, "font-face")?;
        let size = self.style.dim(prefix, "font-size")?;
        let spacing = self.style.dim(prefix, "line-spacing")?;
        let extents = self.shaper.font_extents(font, size);
        let mut width = 0.0f32;
        let mut lines = 0usize;
        for line in text.lines() {
            width = width.max(self.shaper.advance_width(font, size, line));
            lines += 1;
        }
        let height = lines as f32 * extents.height() + spacing * lines.saturating_sub(1) as f32;
        Ok((width, height))
    }

    fn boxed_text_size(&self, text: &str, prefix: &[&str]) -> Result<(f32, f32)> {
        let [pt, pr, pb, pl] = self.style.quad(prefix, "padding")?;
        let [mt, mr, mb, ml] = self.style.quad(prefix, "margin")?;
        let (width, height) = self.text_size(text, prefix)?;
        Ok((pr + mr + width + ml + pl, pt + mt + height + mb + pb))
    }

    fn entity_box_size(&self, id: EntityId) -> Result<(f32, f32)> {
        self.boxed_text_size(&self.ast.entity(id).name, ENTITY)
    }

    /// Header row height: one entity box measured against a fixed sample
    /// string, plus the top page padding. All entity boxes share this height.
    fn header_height(&self) -> Result<f32> {
        let [page_pt, ..] = self.style.quad(PAGE, "padding")?;
        Ok(self.boxed_text_size("TEXT", ENTITY)?.1 + page_pt)
    }

    fn message_box_size(
        &self,
        src: EntityId,
        dst: EntityId,
        kind: MessageKind,
        text: &str,
    ) -> Result<(f32, f32)> {
        let prefix = ["message", kind.as_str()];
        let (text_w, text_h) = self.text_size(text, &prefix)?;
        let [arrow_w, arrow_h] = self.style.pair(&prefix, "arrowhead-size")?;
        let [pt, pr, pb, pl] = self.style.quad(&prefix, "padding")?;
        let [mt, mr, mb, ml] = self.style.quad(&prefix, "margin")?;
        let mut box_pad = 0.0;
        let act_width = self.style.dim(&[], "activity-box-width")?;
        if self.entities[&src].active {
            box_pad += act_width / 2.0;
        }
        if self.entities[&dst].active {
            box_pad += act_width / 2.0;
        }
        Ok((
            box_pad + pl + ml + text_w + arrow_w + mr + pr,
            pt + mt + text_h + arrow_h / 2.0 + mb + pb,
        ))
    }

    fn block_min_size(&self, title: &str, label: &str, prefix: &[&str]) -> Result<(f32, f32)> {
        let [pt, pr, pb, pl] = self.style.quad(prefix, "padding")?;
        let [mt, mr, mb, ml] = self.style.quad(prefix, "margin")?;
        let (title_w, title_h) = self.text_size(title, prefix)?;
        let (label_w, label_h) = self.text_size(label, prefix)?;
        Ok((
            pr + mr + label_w.max(title_w) + ml + pl,
            pt + mt + title_h + mb + mt + label_h + mb + pb,
        ))
    }

    fn separator_height(&self, condition: &str, prefix: &[&str]) -> Result<f32> {
        let [mt, ..] = self.style.quad(prefix, "margin")?;
        Ok(self.text_size(condition, prefix)?.1 + mt)
    }

    // ----- horizontal constraints -----

    fn position(&self, id: EntityId) -> f32 {
        let (reference, offset) = self.entities[&id].constraint;
        match reference {
            Some(reference) => offset + self.position(reference),
            None => offset,
        }
    }

    /// Ensures the gap between two lifelines is at least `width` by rewriting
    /// the rightmost entity's constraint to `(left, width)`. Only ever widens;
    /// `left = None` anchors against the page's left edge.
    fn widen(&mut self, left: Option<EntityId>, right: EntityId, width: f32) {
        // Anchoring an entity against itself would make position() cycle.
        if left == Some(right) {
            return;
        }
        let left_pos = left.map_or(0.0, |id| self.position(id));
        let right_pos = self.position(right);
        let (anchor, moved, dist) = if right_pos < left_pos {
            match left {
                Some(left) => (Some(right), left, left_pos - right_pos),
                None => return,
            }
        } else {
            (left, right, right_pos - left_pos)
        };
        if dist < width
            && let Some(state) = self.entities.get_mut(&moved)
        {
            state.constraint = (anchor, width);
        }
    }

    fn first_entity(&self) -> Option<EntityId> {
        self.entities.keys().next().copied()
    }

    // ----- the walk -----

    fn walk(&mut self, seq: &Sequence) -> Result<()> {
        for op in &seq.operations {
            match op {
                Op::DeclareEntity(id) => self.declare(*id)?,
                Op::Message {
                    src,
                    dst,
                    kind,
                    text,
                } => self.message(*src, *dst, *kind, text)?,
                Op::SetActivationState { entities, active } => {
                    self.set_activation(entities, *active)
                }
                Op::Destroy(id) => self.destroy(*id)?,
                Op::Loop { condition, body } => self.block("loop", condition, body, BLOCK_LOOP)?,
                Op::Opt { condition, body } => self.block("opt", condition, body, BLOCK_OPT)?,
                Op::Alt { branches } => self.alt(branches)?,
                Op::Note {
                    position,
                    entity,
                    text,
                } => self.note(*position, *entity, text)?,
                Op::Wait(count) => {
                    self.cursor += *count as f32 * self.style.dim(&[], "wait-height")?;
                }
            }
        }
        Ok(())
    }

    /// Columns touch edge-to-edge by default: each entity sits half its own
    /// box width past half its predecessor's.
    fn declare(&mut self, id: EntityId) -> Result<()> {
        let mut offset = self.entity_box_size(id)?.0 / 2.0;
        let prev = self.entities.keys().last().copied();
        if let Some(prev) = prev {
            offset += self.entity_box_size(prev)?.0 / 2.0;
        }
        self.entities.insert(
            id,
            EntityState {
                constraint: (prev, offset),
                active: false,
                activity: Vec::new(),
            },
        );
        Ok(())
    }

    fn message(&mut self, src: EntityId, dst: EntityId, kind: MessageKind, text: &str) -> Result<()> {
        let src_active = self.entities[&src].active;
        let dst_active = self.entities[&dst].active;
        self.content.push(Record::Message {
            src,
            dst,
            kind,
            text: text.to_string(),
            top: self.cursor,
            src_active,
            dst_active,
        });
        let (width, height) = self.message_box_size(src, dst, kind, text)?;
        self.cursor += height;
        self.widen(Some(src), dst, width);
        Ok(())
    }

    /// Opening an open interval and closing a closed one are both no-ops.
    fn set_activation(&mut self, entities: &[EntityId], active: bool) {
        for id in entities {
            let cursor = self.cursor;
            let Some(state) = self.entities.get_mut(id) else {
                continue;
            };
            let last_open = state.activity.last().is_some_and(|(_, end)| end.is_none());
            if active && !last_open {
                state.activity.push((cursor, None));
                state.active = true;
            }
            if !active && last_open {
                if let Some(last) = state.activity.last_mut() {
                    last.1 = Some(cursor);
                }
                state.active = false;
            }
        }
    }

    /// Draws an X on the lifeline and closes any open activation there. The
    /// entity record itself stays; later references still lay out.
    fn destroy(&mut self, id: EntityId) -> Result<()> {
        let [mt, _, mb, _] = self.style.quad(DESTROY, "margin")?;
        let size = self.style.dim(DESTROY, "cross-size")?;
        let top = self.cursor;
        if let Some(state) = self.entities.get_mut(&id) {
            if let Some(last) = state.activity.last_mut()
                && last.1.is_none()
            {
                last.1 = Some(top);
            }
            state.active = false;
        }
        self.content.push(Record::DestroyCross { entity: id, top });
        self.cursor = top + mt + size + mb;
        Ok(())
    }

    fn block(
        &mut self,
        title: &'static str,
        condition: &str,
        body: &Sequence,
        prefix: &'static [&'static str],
    ) -> Result<()> {
        let label = format!("[{condition}]");
        let (min_w, min_h) = self.block_min_size(title, &label, prefix)?;
        if let Some(first) = self.first_entity() {
            self.widen(None, first, min_w);
        }
        let [pt, _, pb, _] = self.style.quad(prefix, "padding")?;
        let [mt, _, mb, _] = self.style.quad(prefix, "margin")?;
        let top = self.cursor;
        self.cursor += pt + mt;
        self.walk(body)?;
        self.cursor += pb + mb;
        self.cursor = self.cursor.max(top + min_h);
        let bottom = self.cursor;
        self.backgrounds.push(Record::BlockBackground {
            top,
            bottom,
            prefix,
        });
        self.frame.push(Record::BlockFrame {
            top,
            bottom,
            title,
            label,
            prefix,
        });
        Ok(())
    }

    /// Like a single-branch block, but each later branch starts at a recorded
    /// separator and satisfies its own (separator-sized) minimum before the
    /// next begins. The frame is labeled with the first branch's condition.
    fn alt(&mut self, branches: &[AltBranch]) -> Result<()> {
        let Some((first, rest)) = branches.split_first() else {
            return Ok(());
        };
        let mut min_w = 0.0f32;
        for branch in branches {
            let label = format!("[{}]", branch.condition);
            min_w = min_w.max(self.block_min_size("alt", &label, BLOCK_ALT)?.0);
        }
        if let Some(leftmost) = self.first_entity() {
            self.widen(None, leftmost, min_w);
        }
        let [pt, _, pb, _] = self.style.quad(BLOCK_ALT, "padding")?;
        let [mt, _, mb, _] = self.style.quad(BLOCK_ALT, "margin")?;

        let top = self.cursor;
        let first_label = format!("[{}]", first.condition);
        self.cursor += pt + mt;
        self.walk(&first.body)?;
        let min_h = self.block_min_size("alt", &first_label, BLOCK_ALT)?.1;
        self.cursor = self.cursor.max(top + min_h);

        for branch in rest {
            let label = format!("[{}]", branch.condition);
            self.frame.push(Record::Separator {
                y: self.cursor,
                label,
                prefix: BLOCK_ALT,
            });
            let branch_top = self.cursor;
            self.cursor += pt + mt;
            self.walk(&branch.body)?;
            let branch_min = self.separator_height(&branch.condition, BLOCK_ALT)?;
            self.cursor = self.cursor.max(branch_top + branch_min);
        }
        self.cursor += pb + mb;
        let bottom = self.cursor;

        self.backgrounds.push(Record::BlockBackground {
            top,
            bottom,
            prefix: BLOCK_ALT,
        });
        self.frame.push(Record::BlockFrame {
            top,
            bottom,
            title: "alt",
            label: first_label,
            prefix: BLOCK_ALT,
        });
        Ok(())
    }

    /// Notes widen against both neighbours; without a right neighbour the
    /// overhang past the previous entity's box goes into the extra right
    /// padding accumulator instead.
    fn note(&mut self, position: NotePosition, entity: EntityId, text: &str) -> Result<()> {
        let prefix = note_prefix(position);
        let (width, height) = self.boxed_text_size(text, prefix)?;
        let index = self.entities.get_index_of(&entity).unwrap_or(0);
        let prev = index
            .checked_sub(1)
            .and_then(|i| self.entities.get_index(i))
            .map(|(id, _)| *id);
        self.widen(prev, entity, width / 2.0);
        match self.entities.get_index(index + 1).map(|(id, _)| *id) {
            Some(next) => self.widen(Some(entity), next, width / 2.0),
            None => {
                let prev_box = match prev {
                    Some(prev) => self.entity_box_size(prev)?.0,
                    None => 0.0,
                };
                let padding = width / 2.0 - prev_box;
                self.extra_right_padding = self.extra_right_padding.max(padding);
            }
        }
        self.content.push(Record::Note {
            entity,
            position,
            text: text.to_string(),
            top: self.cursor,
        });
        self.cursor += height;
        Ok(())
    }

    // ----- lowering -----

    fn total_size(&self) -> Result<(f32, f32)> {
        let [_, _, page_pb, _] = self.style.quad(PAGE, "padding")?;
        let width = match self.entities.keys().last().copied() {
            Some(last) => {
                self.position(last) + self.entity_box_size(last)?.0 / 2.0
                    + self.extra_right_padding
            }
            None => self.extra_right_padding,
        };
        Ok((width, self.cursor + page_pb))
    }

    fn finish(mut self) -> Result<Compiled> {
        let (width, height) = self.total_size()?;
        self.total_width = width;
        let bottom = self.cursor;

        let mut layers = Layers::default();
        layers.background.push(DrawCommand::FillRect {
            x: 0.0,
            y: 0.0,
            width,
            height,
            color: self.style.color(PAGE, "background-color")?,
            selector: "page".to_string(),
        });
        let backgrounds = std::mem::take(&mut self.backgrounds);
        for record in &backgrounds {
            self.lower(record, &mut layers.background)?;
        }
        self.lower_base(bottom, &mut layers.base)?;
        let content = std::mem::take(&mut self.content);
        for record in &content {
            self.lower(record, &mut layers.content)?;
        }
        let frame = std::mem::take(&mut self.frame);
        for record in &frame {
            self.lower(record, &mut layers.frame)?;
        }

        Ok(Compiled {
            width,
            height,
            layers,
        })
    }

    /// Entity header boxes, lifelines and activation bars, in entity order.
    fn lower_base(&self, bottom: f32, out: &mut Vec<DrawCommand>) -> Result<()> {
        let [page_pt, ..] = self.style.quad(PAGE, "padding")?;
        let [_, _, entity_pb, _] = self.style.quad(ENTITY, "padding")?;
        let act_width = self.style.dim(&[], "activity-box-width")?;
        for (id, state) in &self.entities {
            let center = self.position(*id);
            let (box_w, box_h) = self.entity_box_size(*id)?;
            self.draw_boxed_text(
                center - box_w / 2.0,
                page_pt,
                &self.ast.entity(*id).name,
                ENTITY,
                out,
            )?;
            self.draw_line(center, box_h - entity_pb, center, bottom, LIFELINE, out)?;
            for (start, end) in &state.activity {
                let end = end.unwrap_or(bottom);
                self.draw_rectangle(
                    center - act_width / 2.0,
                    *start,
                    act_width,
                    end - start,
                    ACTIVITY_BOX,
                    out,
                )?;
            }
        }
        Ok(())
    }

    fn lower(&self, record: &Record, out: &mut Vec<DrawCommand>) -> Result<()> {
        match record {
            Record::Message {
                src,
                dst,
                kind,
                text,
                top,
                src_active,
                dst_active,
            } => self.draw_message(*src, *dst, *kind, text, *top, *src_active, *dst_active, out),
            Record::Note {
                entity,
                position,
                text,
                top,
            } => {
                let prefix = note_prefix(*position);
                let (width, _) = self.boxed_text_size(text, prefix)?;
                let center = self.position(*entity);
                self.draw_boxed_text(center - width / 2.0, *top, text, prefix, out)
            }
            Record::DestroyCross { entity, top } => self.draw_destroy(*entity, *top, out),
            Record::BlockBackground {
                top,
                bottom,
                prefix,
            } => self.draw_block_background(*top, *bottom, prefix, out),
            Record::BlockFrame {
                top,
                bottom,
                title,
                label,
                prefix,
            } => self.draw_block_frame(*top, *bottom, title, label, prefix, out),
            Record::Separator { y, label, prefix } => self.draw_separator(*y, label, prefix, out),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_message(
        &self,
        src: EntityId,
        dst: EntityId,
        kind: MessageKind,
        text: &str,
        top: f32,
        src_active: bool,
        dst_active: bool,
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let prefix = ["message", kind.as_str()];
        let mut src_loc = self.position(src);
        let mut dst_loc = self.position(dst);
        let [mt, mr, mb, ml] = self.style.quad(&prefix, "margin")?;
        let (text_w, text_h) = self.text_size(text, &prefix)?;

        let delta = dst_loc - src_loc;
        // A self-message has no bearing; treat it as rightward.
        let bearing = if delta == 0.0 { 1.0 } else { delta / delta.abs() };
        let act_pad = self.style.dim(&[], "activity-box-width")? / 2.0;
        if src_active {
            src_loc += bearing * act_pad;
        }
        if dst_active {
            dst_loc -= bearing * act_pad;
        }

        let text_loc = if src_loc < dst_loc {
            src_loc + ml
        } else {
            src_loc - text_w - mr
        };

        out.push(DrawCommand::FillRect {
            x: text_loc,
            y: top,
            width: text_w,
            height: text_h,
            color: self.style.color(&prefix, "background-color")?,
            selector: prefix.join("."),
        });
        let line_y = top + text_h + mb + mt;
        self.draw_line(src_loc, line_y, dst_loc, line_y, &prefix, out)?;
        self.draw_text(text_loc, top, text, &prefix, out)?;
        // The head sits half a margin above the line under non-default
        // margins; kept as-is.
        self.draw_arrowhead(bearing, dst_loc, top + text_h, &prefix, out)
    }

    fn draw_destroy(&self, entity: EntityId, top: f32, out: &mut Vec<DrawCommand>) -> Result<()> {
        let [mt, ..] = self.style.quad(DESTROY, "margin")?;
        let size = self.style.dim(DESTROY, "cross-size")?;
        let center = self.position(entity);
        let half = size / 2.0;
        let cy = top + mt + half;
        self.draw_line(center - half, cy - half, center + half, cy + half, DESTROY, out)?;
        self.draw_line(center - half, cy + half, center + half, cy - half, DESTROY, out)
    }

    fn draw_block_background(
        &self,
        top: f32,
        bottom: f32,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let (x, y, width, height) = self.block_rect(top, bottom, prefix)?;
        out.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color: self.style.color(prefix, "background-color")?,
            selector: prefix.join("."),
        });
        Ok(())
    }

    fn draw_block_frame(
        &self,
        top: f32,
        bottom: f32,
        title: &str,
        label: &str,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let [mt, mr, mb, ml] = self.style.quad(prefix, "margin")?;
        let (x, y, width, height) = self.block_rect(top, bottom, prefix)?;
        let color = self.style.color(prefix, "color")?;
        let line_width = self.style.dim(prefix, "line-width")?;
        let (title_w, title_h) = self.text_size(title, prefix)?;

        out.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            color,
            line_width,
            selector: prefix.join("."),
        });
        self.draw_text(x + ml, y + mt, title, prefix, out)?;
        self.draw_text(x + ml, y + mt + title_h + mb + mt, label, prefix, out)?;

        // Pentagon outline under the title, open at the frame edge.
        out.push(DrawCommand::Polyline {
            points: vec![
                (x, y + mt + title_h + mb),
                (x + mr + title_w, y + mt + title_h + mb),
                (x + mr + title_w + ml, y + mt + title_h),
                (x + mr + title_w + ml, y),
            ],
            color,
            line_width,
            selector: prefix.join("."),
        });
        Ok(())
    }

    fn draw_separator(
        &self,
        y: f32,
        label: &str,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let [_, ppr, _, ppl] = self.style.quad(PAGE, "padding")?;
        let [_, pr, _, pl] = self.style.quad(prefix, "padding")?;
        let [mt, _, _, ml] = self.style.quad(prefix, "margin")?;
        let width = self.total_width - (ppl + pl + ppr + pr);
        let dash =
            (self.style.keyword(prefix, "separator-style")? == "dash").then_some(DASH_PATTERN);
        out.push(DrawCommand::Line {
            x1: ppl + pl,
            y1: y,
            x2: ppl + pl + width,
            y2: y,
            color: self.style.color(prefix, "color")?,
            line_width: self.style.dim(prefix, "line-width")?,
            dash,
            selector: prefix.join("."),
        });
        self.draw_text(ppl + pl + ml, y + mt, label, prefix, out)
    }

    fn block_rect(&self, top: f32, bottom: f32, prefix: &[&str]) -> Result<(f32, f32, f32, f32)> {
        let [_, ppr, _, ppl] = self.style.quad(PAGE, "padding")?;
        let [pt, pr, pb, pl] = self.style.quad(prefix, "padding")?;
        Ok((
            ppl + pl,
            top + pt,
            self.total_width - (ppl + pl + ppr + pr),
            bottom - top - pb - pt,
        ))
    }

    // ----- primitive emitters -----

    fn draw_line(
        &self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let dash = (self.style.keyword(prefix, "line-type")? == "dash").then_some(DASH_PATTERN);
        out.push(DrawCommand::Line {
            x1,
            y1,
            x2,
            y2,
            color: self.style.color(prefix, "color")?,
            line_width: self.style.dim(prefix, "line-width")?,
            dash,
            selector: prefix.join("."),
        });
        Ok(())
    }

    /// Lines paint top to bottom from `y`; each line's baseline sits one
    /// ascent below its top. Lines are trimmed before painting.
    fn draw_text(
        &self,
        x: f32,
        y: f32,
        text: &str,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let color = self.style.color(prefix, "text-color")?;
        let font = self.style.font(prefix, "font-face")?.clone();
        let size = self.style.dim(prefix, "font-size")?;
        let spacing = self.style.dim(prefix, "line-spacing")?;
        let extents = self.shaper.font_extents(&font, size);
        let mut y = y;
        for line in text.lines() {
            y += extents.ascent;
            out.push(DrawCommand::Text {
                x,
                baseline: y,
                text: line.trim().to_string(),
                font: font.clone(),
                size,
                color,
                selector: prefix.join("."),
            });
            y += extents.descent + spacing;
        }
        Ok(())
    }

    /// Stroke first, fill on top.
    fn draw_rectangle(
        &self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        out.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            color: self.style.color(prefix, "color")?,
            line_width: self.style.dim(prefix, "line-width")?,
            selector: prefix.join("."),
        });
        out.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color: self.style.color(prefix, "background-color")?,
            selector: prefix.join("."),
        });
        Ok(())
    }

    /// The box rectangle spans the margins; padding offsets the whole box
    /// within the given origin.
    fn draw_boxed_text(
        &self,
        x: f32,
        y: f32,
        text: &str,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let (text_w, text_h) = self.text_size(text, prefix)?;
        let [pt, _, _, pl] = self.style.quad(prefix, "padding")?;
        let [mt, mr, mb, ml] = self.style.quad(prefix, "margin")?;
        self.draw_rectangle(x + pl, y + pt, mr + ml + text_w, mt + mb + text_h, prefix, out)?;
        self.draw_text(x + pl + ml, y + pt + mt, text, prefix, out)
    }

    fn draw_arrowhead(
        &self,
        bearing: f32,
        x: f32,
        y: f32,
        prefix: &[&str],
        out: &mut Vec<DrawCommand>,
    ) -> Result<()> {
        let kind = ArrowheadKind::from_keyword(self.style.keyword(prefix, "arrowhead-type")?);
        let [width, height] = self.style.pair(prefix, "arrowhead-size")?;
        let direction = if bearing >= 0.0 {
            Direction::Right
        } else {
            Direction::Left
        };
        out.push(DrawCommand::Arrowhead {
            tip: (x, y),
            direction,
            width,
            height,
            kind,
            color: self.style.color(prefix, "color")?,
            fill_color: self.style.color(prefix, "arrowhead-fill-color")?,
            line_width: self.style.dim(prefix, "line-width")?,
            selector: prefix.join("."),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::style::default_stylesheet;
    use crate::text_metrics::FixedMetrics;

    // FixedMetrics at font-size 10: every glyph 6 wide, line height 10.
    fn build(source: &str) -> Compiled {
        let ast = parse(source).unwrap();
        compile(&ast, &default_stylesheet(), &FixedMetrics::default()).unwrap()
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {expected}, got {actual}"
        );
    }

    fn content_lines<'a>(compiled: &'a Compiled, selector: &str) -> Vec<&'a DrawCommand> {
        compiled
            .layers
            .content
            .iter()
            .filter(|cmd| matches!(cmd, DrawCommand::Line { selector: s, .. } if s == selector))
            .collect()
    }

    #[test]
    fn canvas_size_matches_touching_columns() {
        // Entity box: 10+10+6+10+10 = 46 wide, so centers sit at 23 and 69.
        // Header 48, message 26, wait 23, bottom page padding 5.
        let compiled = build("a->b \"hi\"\nwait");
        assert_close(compiled.width, 92.0);
        assert_close(compiled.height, 102.0);
    }

    #[test]
    fn wait_advances_by_count_times_height() {
        let one = build("a->b \"hi\"\nwait");
        let three = build("a->b \"hi\"\nwait 3");
        assert_close(three.height - one.height, 2.0 * 23.0);
    }

    #[test]
    fn entity_headers_paint_left_to_right_in_mention_order() {
        let compiled = build("c->a \"x\"\na->b \"y\"");
        let xs: Vec<f32> = compiled
            .layers
            .base
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::Text { x, .. } => Some(*x),
                _ => None,
            })
            .collect();
        assert_eq!(xs.len(), 3);
        assert!(xs[0] < xs[1] && xs[1] < xs[2]);
    }

    #[test]
    fn wide_message_rewrites_destination_constraint() {
        // The long a->c message exceeds the default gap, so c is re-anchored
        // to a at exactly the message box width.
        let text = "a very long message that forces widening";
        let source = format!("a->b \"m\"\nb->c \"m\"\na->c \"{text}\"");
        let compiled = build(&source);
        let expected = text.chars().count() as f32 * 6.0 + 22.0;
        let lines = content_lines(&compiled, "message.call");
        let DrawCommand::Line { x1, x2, .. } = lines[2] else {
            panic!("expected a message line");
        };
        assert_close(x2 - x1, expected);
        // Canvas width follows the rewritten chain: position(c) + half box.
        assert_close(compiled.width, 23.0 + expected + 23.0);
    }

    #[test]
    fn respond_draws_from_responder_to_receiver() {
        let call = build("declare a\ndeclare b\na->b \"X\"");
        let respond = build("declare a\ndeclare b\nb<-a \"X\"");
        let tip_of = |compiled: &Compiled| {
            compiled
                .layers
                .content
                .iter()
                .find_map(|cmd| match cmd {
                    DrawCommand::Arrowhead { tip, direction, .. } => Some((*tip, *direction)),
                    _ => None,
                })
                .unwrap()
        };
        let (call_tip, call_dir) = tip_of(&call);
        let (resp_tip, resp_dir) = tip_of(&respond);
        assert_close(call_tip.0, resp_tip.0);
        assert_close(call_tip.1, resp_tip.1);
        assert_eq!(call_dir, Direction::Right);
        assert_eq!(resp_dir, Direction::Right);
    }

    #[test]
    fn respond_line_is_dashed() {
        let compiled = build("declare a\ndeclare b\nb<-a \"X\"");
        let lines = content_lines(&compiled, "message.respond");
        let DrawCommand::Line { dash, .. } = lines[0] else {
            panic!("expected a message line");
        };
        assert_eq!(*dash, Some(DASH_PATTERN));
    }

    #[test]
    fn activation_toggles_are_idempotent() {
        let compiled =
            build("activate a\nactivate a\na->b \"x\"\ndeactivate a\ndeactivate a");
        let bars: Vec<_> = compiled
            .layers
            .base
            .iter()
            .filter(|cmd| {
                matches!(cmd, DrawCommand::FillRect { selector, .. } if selector == "activity-box")
            })
            .collect();
        assert_eq!(bars.len(), 1);
        let DrawCommand::FillRect { height, .. } = bars[0] else {
            unreachable!();
        };
        // Interval spans exactly the message row (26), not the whole page.
        assert_close(*height, 26.0);
    }

    #[test]
    fn open_activation_extends_to_diagram_bottom() {
        let compiled = build("activate a\na->b \"x\"\nwait");
        let bar = compiled
            .layers
            .base
            .iter()
            .find_map(|cmd| match cmd {
                DrawCommand::FillRect {
                    y,
                    height,
                    selector,
                    ..
                } if selector == "activity-box" => Some((*y, *height)),
                _ => None,
            })
            .unwrap();
        // Header 48 to bottom 48+26+23 = 97.
        assert_close(bar.0, 48.0);
        assert_close(bar.1, 49.0);
    }

    #[test]
    fn empty_alt_reserves_minimum_height_and_one_separator() {
        let base = build("a->b \"x\"\nwait");
        let with_alt = build("a->b \"x\"\nwait\nalt \"c1\" { } else \"c2\" { }");
        // First branch 50 (block minimum), second 15 (separator minimum
        // exceeds the empty body), closing padding 10.
        assert_close(with_alt.height - base.height, 75.0);
        let separators = with_alt
            .layers
            .frame
            .iter()
            .filter(|cmd| matches!(cmd, DrawCommand::Line { .. }))
            .count();
        assert_eq!(separators, 1);
    }

    #[test]
    fn alt_frame_is_labeled_with_first_condition() {
        let compiled = build("a->b \"x\"\nalt \"yes\" { } else \"no\" { }");
        let labels: Vec<&str> = compiled
            .layers
            .frame
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(labels.contains(&"alt"));
        assert!(labels.contains(&"[yes]"));
    }

    #[test]
    fn destroy_closes_activation_and_draws_cross() {
        let compiled = build("activate a\na->b \"x\"\ndestroy a\nwait");
        let crosses = content_lines(&compiled, "destroy");
        assert_eq!(crosses.len(), 2);
        let bar_height = compiled
            .layers
            .base
            .iter()
            .find_map(|cmd| match cmd {
                DrawCommand::FillRect {
                    height, selector, ..
                } if selector == "activity-box" => Some(*height),
                _ => None,
            })
            .unwrap();
        // Closed at the cross, not the diagram bottom.
        assert_close(bar_height, 26.0);
    }

    #[test]
    fn destroy_advances_cursor_by_cross_and_margins() {
        let without = build("a->b \"x\"\nwait");
        let with = build("a->b \"x\"\ndestroy a\nwait");
        // margin-top 4 + cross 14 + margin-bottom 4.
        assert_close(with.height - without.height, 22.0);
    }

    #[test]
    fn trailing_note_adds_extra_right_padding() {
        // Note box: 10+10+27*6+10+10 = 202; half overhangs past b whose box
        // is 46 wide, widening both the a-b gap and the right edge.
        let compiled = build("a->b \"x\"\nnote right of b \"wide note text here padding\"");
        assert_close(compiled.width, 202.0);
    }

    #[test]
    fn note_is_centered_on_its_entity() {
        let compiled = build("a->b \"x\"\nnote over a \"hello\"");
        let note_rect = compiled
            .layers
            .content
            .iter()
            .find_map(|cmd| match cmd {
                DrawCommand::FillRect {
                    x,
                    width,
                    selector,
                    ..
                } if selector == "note.over" => Some((*x, *width)),
                _ => None,
            })
            .unwrap();
        // Box rect spans the margins around the text, centered on a. The
        // note's half-width pushed a itself out to 35.
        assert_close(note_rect.1, 20.0 + 5.0 * 6.0);
        assert_close(note_rect.0 + note_rect.1 / 2.0, 35.0);
    }

    #[test]
    fn wide_note_between_entities_widens_the_gap() {
        // Note box 40 + 9*6 = 94; its half-width (47) exceeds both the
        // page-left gap and the default 46 a-b gap, so both are rewritten.
        let compiled = build("a->b \"x\"\nnote over a \"wide text\"");
        let lifelines: Vec<f32> = compiled
            .layers
            .base
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::Line { x1, selector, .. } if selector == "lifeline" => Some(*x1),
                _ => None,
            })
            .collect();
        assert_eq!(lifelines.len(), 2);
        assert_close(lifelines[0], 47.0);
        assert_close(lifelines[1], 94.0);
    }

    #[test]
    fn self_message_keeps_its_column_anchored() {
        // a->a must not re-anchor a against itself; the column stays put and
        // the line starts and ends on the single lifeline.
        let compiled = build("a~>a \"ping\"\nwait");
        assert_close(compiled.width, 46.0);
        let lines = content_lines(&compiled, "message.send");
        let DrawCommand::Line { x1, x2, .. } = lines[0] else {
            panic!("expected a message line");
        };
        assert_close(*x1, 23.0);
        assert_close(*x2, 23.0);
    }

    #[test]
    fn paint_order_starts_with_page_fill() {
        let compiled = build("a->b \"x\"\nwait");
        let first = compiled.commands().next().unwrap();
        assert!(matches!(
            first,
            DrawCommand::FillRect { selector, .. } if selector == "page"
        ));
    }

    #[test]
    fn missing_style_rule_fails_the_compile() {
        let ast = parse("a->b \"x\"\nwait").unwrap();
        let err = compile(&ast, &StyleSheet::default(), &FixedMetrics::default()).unwrap_err();
        assert!(matches!(err, crate::error::Error::StyleNotFound(_)));
    }
}
