//! MFRC522 reader behind [`PresenceSource`].

use mfrc522::comm::Interface;
use mfrc522::{AtqA, Error as RcError, Initialized, Mfrc522};

use gate_core::hal::{PresenceSignal, PresenceSource, SelectError};
use gate_core::identity::CardUid;
use gate_core::presence::WakeupAnswers;

pub struct CardReader<COMM: Interface> {
    rc: Mfrc522<COMM, Initialized>,
    answers: WakeupAnswers<AtqA>,
}

impl<COMM: Interface> CardReader<COMM> {
    pub fn new(rc: Mfrc522<COMM, Initialized>) -> Self {
        Self {
            rc,
            answers: WakeupAnswers::new(),
        }
    }
}

fn map_error<E>(err: RcError<E>) -> SelectError {
    match err {
        RcError::Collision => SelectError::Collision,
        RcError::Timeout => SelectError::Timeout,
        RcError::Crc => SelectError::Crc,
        _ => SelectError::Transceiver,
    }
}

impl<COMM: Interface> PresenceSource for CardReader<COMM> {
    fn wakeup(&mut self) -> PresenceSignal {
        // WUPA rather than REQA so a halted card that is still in the field
        // answers again.
        match self.rc.wupa() {
            Ok(atqa) => {
                self.answers.woke(Some(atqa));
                PresenceSignal::Present
            }
            Err(err) => {
                // A collision leaves no usable ATQA either.
                self.answers.woke(None);
                match err {
                    RcError::Collision => PresenceSignal::Collision,
                    _ => PresenceSignal::None,
                }
            }
        }
    }

    fn select(&mut self, prior: Option<&CardUid>) -> Result<CardUid, SelectError> {
        let confirming = prior.is_some();
        if confirming && !self.answers.has_fresh() {
            // Give a locked card one more chance to wake before falling back
            // to the answer it gave when the session opened.
            if let Ok(atqa) = self.rc.wupa() {
                self.answers.woke(Some(atqa));
            }
        }

        let atqa = self
            .answers
            .for_select(confirming)
            .ok_or(SelectError::NoCard)?;
        let result = self
            .rc
            .select(atqa)
            .map_err(map_error)
            .and_then(|uid| CardUid::from_bytes(uid.as_bytes()).ok_or(SelectError::Transceiver));

        let uid = match result {
            Ok(uid) => uid,
            Err(e) => {
                self.answers.failed();
                return Err(e);
            }
        };
        match prior {
            Some(expected) if *expected != uid => {
                log::debug!("reader: expected {} got {}", expected, uid);
                self.answers.failed();
                Err(SelectError::NoCard)
            }
            _ => {
                self.answers.selected();
                Ok(uid)
            }
        }
    }

    fn halt(&mut self) {
        if let Err(e) = self.rc.hlta() {
            log::debug!("reader: hlta failed: {:?}", map_error(e));
        }
    }

    fn clear_selection(&mut self) {
        self.answers.clear();
    }
}
