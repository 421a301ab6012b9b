//! Wake-up answers kept between a reader's wake-up and its select.
//!
//! An ISO 14443A select is addressed with the answer (ATQA) a card gave to the
//! preceding wake-up. A noisy wake-up leaves no fresh answer, but a locked
//! session must still try to reach its card before declaring it gone, so the
//! answer that opened the session is kept for that case.

#[derive(Debug)]
pub struct WakeupAnswers<A> {
    fresh: Option<A>,
    locked: Option<A>,
}

impl<A> WakeupAnswers<A> {
    pub const fn new() -> Self {
        Self {
            fresh: None,
            locked: None,
        }
    }

    /// Record the outcome of a wake-up. `None` for no answer or a garbled one.
    pub fn woke(&mut self, answer: Option<A>) {
        self.fresh = answer;
    }

    pub fn has_fresh(&self) -> bool {
        self.fresh.is_some()
    }

    /// Answer to address the next select with. Confirming a locked card falls
    /// back to the answer it gave when the session opened.
    pub fn for_select(&self, confirming: bool) -> Option<&A> {
        match (&self.fresh, confirming) {
            (Some(fresh), _) => Some(fresh),
            (None, true) => self.locked.as_ref(),
            (None, false) => None,
        }
    }

    /// The select succeeded; a fresh answer becomes the one to fall back on.
    pub fn selected(&mut self) {
        if let Some(fresh) = self.fresh.take() {
            self.locked = Some(fresh);
        }
    }

    /// The select failed; the fresh answer is spent.
    pub fn failed(&mut self) {
        self.fresh = None;
    }

    /// Forget everything, including the session's answer.
    pub fn clear(&mut self) {
        self.fresh = None;
        self.locked = None;
    }
}

impl<A> Default for WakeupAnswers<A> {
    fn default() -> Self {
        Self::new()
    }
}
