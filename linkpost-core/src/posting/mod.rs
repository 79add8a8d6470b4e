mod actor;
mod challenge;
mod classify;
mod evidence;
mod forms;

pub use actor::{
    ActorStep, ActorTimeouts, AttemptReport, AttemptRequest, NoopObserver, PostingActor,
    StepObserver,
};
pub use challenge::{ChallengeDetector, ChallengeSignal};
pub use classify::{Classification, PhraseSet};
pub use evidence::{
    inline_note_url, EvidenceError, EvidenceKind, EvidenceResult, EvidenceStore, FsEvidenceStore,
};
pub use forms::{FormSignature, LocatedForm};
