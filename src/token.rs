/// Associates readiness events with the socket slot that registered them.
///
/// The reactor uses the socket registry index as the token, so a readiness
/// event maps straight back to its slab entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Token(pub usize);

impl From<Token> for usize {
    fn from(val: Token) -> usize {
        val.0
    }
}
