use crate::palette::Palette;
use crate::types::Theme;

/// Identifier of the single persistent mouse pointer.
pub const MOUSE_POINTER_ID: i64 = -1;

/// Touch records kept at most; beyond this the oldest lifted one is reused.
pub const MAX_TOUCH_POINTERS: usize = 10;

/// One mouse or touch contact in texture space (`y` up, both axes in `0..=1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub id: i64,
    pub texcoord: [f32; 2],
    pub prev_texcoord: [f32; 2],
    pub delta: [f32; 2],
    pub down: bool,
    pub moved: bool,
    pub color: [f32; 3],
    last_active: u64,
}

impl Pointer {
    fn new(id: i64) -> Self {
        Self {
            id,
            texcoord: [0.0; 2],
            prev_texcoord: [0.0; 2],
            delta: [0.0; 2],
            down: false,
            moved: false,
            color: [0.0; 3],
            last_active: 0,
        }
    }
}

/// Impulse waiting to be applied on the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub point: [f32; 2],
    pub force: [f32; 2],
    pub color: [f32; 3],
}

/// Turns raw window input into pointer records.
///
/// Handlers only mutate records; the orchestrator drains them once per frame
/// with [`PointerTracker::take_splats`].
#[derive(Debug)]
pub struct PointerTracker {
    pointers: Vec<Pointer>,
    viewport: (u32, u32),
    theme: Theme,
    palette: Palette,
    clock: u64,
}

impl PointerTracker {
    pub fn new(viewport: (u32, u32), theme: Theme, palette: Palette) -> Self {
        Self {
            pointers: vec![Pointer::new(MOUSE_POINTER_ID)],
            viewport,
            theme,
            palette,
            clock: 0,
        }
    }

    pub fn set_viewport(&mut self, viewport: (u32, u32)) {
        self.viewport = viewport;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    pub fn pointer(&self, id: i64) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    pub fn mouse(&self) -> &Pointer {
        &self.pointers[0]
    }

    fn aspect(&self) -> f32 {
        let (w, h) = self.viewport;
        w.max(1) as f32 / h.max(1) as f32
    }

    fn texcoord(&self, x: f32, y: f32) -> [f32; 2] {
        let (w, h) = self.viewport;
        [x / w.max(1) as f32, 1.0 - y / h.max(1) as f32]
    }

    /// Keeps a visually diagonal drag diagonal on non-square surfaces.
    fn correct_delta(&self, mut delta: [f32; 2]) -> [f32; 2] {
        let aspect = self.aspect();
        if aspect < 1.0 {
            delta[0] *= aspect;
        }
        if aspect > 1.0 {
            delta[1] /= aspect;
        }
        delta
    }

    fn press(&mut self, index: usize, x: f32, y: f32, moved: bool) {
        self.clock += 1;
        let texcoord = self.texcoord(x, y);
        let color = self.palette.next_color(self.theme);
        let pointer = &mut self.pointers[index];
        pointer.down = true;
        pointer.moved = moved;
        pointer.texcoord = texcoord;
        pointer.prev_texcoord = texcoord;
        pointer.delta = [0.0; 2];
        pointer.color = color;
        pointer.last_active = self.clock;
    }

    fn drag(&mut self, index: usize, x: f32, y: f32) {
        self.clock += 1;
        let texcoord = self.texcoord(x, y);
        let previous = self.pointers[index].texcoord;
        let delta = self.correct_delta([texcoord[0] - previous[0], texcoord[1] - previous[1]]);
        let pointer = &mut self.pointers[index];
        pointer.prev_texcoord = previous;
        pointer.texcoord = texcoord;
        pointer.delta = delta;
        pointer.moved = delta[0].abs() > 0.0 || delta[1].abs() > 0.0;
        pointer.last_active = self.clock;
    }

    /// Every press splats once, even without movement.
    pub fn mouse_down(&mut self, x: f32, y: f32) {
        self.press(0, x, y, true);
    }

    pub fn mouse_move(&mut self, x: f32, y: f32) {
        if self.pointers[0].down {
            self.drag(0, x, y);
        }
    }

    pub fn mouse_up(&mut self) {
        self.pointers[0].down = false;
    }

    fn touch_index(&self, id: i64) -> Option<usize> {
        self.pointers
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, p)| p.id == id)
            .map(|(index, _)| index)
    }

    fn touch_slot(&mut self, id: i64) -> Option<usize> {
        if let Some(index) = self.touch_index(id) {
            return Some(index);
        }
        if self.pointers.len() - 1 < MAX_TOUCH_POINTERS {
            self.pointers.push(Pointer::new(id));
            return Some(self.pointers.len() - 1);
        }
        let recycled = self
            .pointers
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, p)| !p.down)
            .min_by_key(|(_, p)| p.last_active)
            .map(|(index, _)| index)?;
        self.pointers[recycled] = Pointer::new(id);
        Some(recycled)
    }

    pub fn touch_start(&mut self, id: u64, x: f32, y: f32) {
        let id = id as i64;
        match self.touch_slot(id) {
            Some(index) => self.press(index, x, y, false),
            None => tracing::debug!(id, "all touch slots held; ignoring touch"),
        }
    }

    pub fn touch_move(&mut self, id: u64, x: f32, y: f32) {
        if let Some(index) = self.touch_index(id as i64) {
            if self.pointers[index].down {
                self.drag(index, x, y);
            }
        }
    }

    /// Lifts the touch but keeps its record for a later reuse.
    pub fn touch_end(&mut self, id: u64) {
        if let Some(index) = self.touch_index(id as i64) {
            self.pointers[index].down = false;
        }
    }

    /// Drains moved pointers into splats with their delta scaled by `force`.
    pub fn take_splats(&mut self, force: f32) -> Vec<Splat> {
        let mut splats = Vec::new();
        for pointer in &mut self.pointers {
            if !pointer.moved {
                continue;
            }
            pointer.moved = false;
            splats.push(Splat {
                point: pointer.texcoord,
                force: [pointer.delta[0] * force, pointer.delta[1] * force],
                color: pointer.color,
            });
        }
        splats
    }
}
