//! # RESP Array Encoding
//!
//! Purpose: Turn ordered commands into one exactly-sized RESP2 buffer of
//! arrays of bulk strings.
//!
//! ## Design Principles
//! 1. **Two Passes**: Sizes (including decimal length prefixes) are summed
//!    before the single allocation; the write pass never grows the buffer.
//! 2. **Binary-Safe**: Arguments are raw bytes; zero-length arguments still
//!    produce `$0\r\n\r\n`.
//! 3. **Fail Loudly**: Commands without arguments and any size mismatch abort
//!    the request instead of sending a malformed buffer.
//!
//! ## Frame Layout
//!
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<bytes>\r\n     (once per argument)
//! ```

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{error, trace};

use respgate_common::{GatewayError, GatewayResult};

use crate::expr::{Expr, RequestContext};

const CRLF: &[u8] = b"\r\n";

/// Number of ASCII decimal digits needed to print `value`.
///
/// Uses repeated division so it agrees with the digit writer below.
#[inline]
pub fn digit_count(mut value: usize) -> usize {
    let mut digits = 0;
    loop {
        value /= 10;
        digits += 1;
        if value == 0 {
            return digits;
        }
    }
}

/// Size of a command header: `*<argc>\r\n`.
#[inline]
fn header_len(argc: usize) -> usize {
    1 + digit_count(argc) + CRLF.len()
}

/// Size of one bulk string: `$<len>\r\n<bytes>\r\n`.
#[inline]
fn bulk_len(len: usize) -> usize {
    1 + digit_count(len) + CRLF.len() + len + CRLF.len()
}

/// Computes the encoded size of flattened commands.
///
/// `argcs[i]` is the argument count of command `i`; `args` holds every
/// argument in command order. The counts must add up to `args.len()`.
pub fn encoded_len<A: AsRef<[u8]>>(argcs: &[usize], args: &[A]) -> GatewayResult<usize> {
    let declared: usize = argcs.iter().sum();
    if declared != args.len() {
        error!(declared, supplied = args.len(), "redis query argument count mismatch");
        return Err(GatewayError::ArgumentCountMismatch {
            declared,
            supplied: args.len(),
        });
    }

    let mut len = 0;
    let mut args = args.iter();
    for (index, &argc) in argcs.iter().enumerate() {
        if argc == 0 {
            return Err(GatewayError::EmptyCommand { index });
        }
        len += header_len(argc);
        for arg in args.by_ref().take(argc) {
            len += bulk_len(arg.as_ref().len());
        }
    }
    Ok(len)
}

/// Encodes flattened commands into one buffer.
pub fn encode_flat<A: AsRef<[u8]>>(argcs: &[usize], args: &[A]) -> GatewayResult<Bytes> {
    let computed = encoded_len(argcs, args)?;
    let mut buf = BytesMut::with_capacity(computed);

    let mut args = args.iter();
    for &argc in argcs {
        buf.put_u8(b'*');
        push_usize(&mut buf, argc);
        buf.put_slice(CRLF);
        for arg in args.by_ref().take(argc) {
            let arg = arg.as_ref();
            buf.put_u8(b'$');
            push_usize(&mut buf, arg.len());
            buf.put_slice(CRLF);
            buf.put_slice(arg);
            buf.put_slice(CRLF);
        }
    }

    finish(buf, computed)
}

/// Encodes nested commands, e.g. `&[&[b"get", b"x"]]`.
pub fn encode_commands<C, A>(commands: &[C]) -> GatewayResult<Bytes>
where
    C: AsRef<[A]>,
    A: AsRef<[u8]>,
{
    let argcs: Vec<usize> = commands.iter().map(|cmd| cmd.as_ref().len()).collect();
    let args: Vec<&[u8]> = commands
        .iter()
        .flat_map(|cmd| cmd.as_ref().iter().map(AsRef::as_ref))
        .collect();
    encode_flat(&argcs, &args)
}

/// Resolves every argument expression and encodes the result.
///
/// Arguments are resolved exactly once, in command order then argument
/// order. Constant arguments are borrowed from the template. Any resolution
/// failure aborts the whole query.
pub fn encode_query<C: RequestContext + ?Sized>(
    queries: &[Vec<Expr>],
    ctx: &C,
    trace_arguments: bool,
) -> GatewayResult<Bytes> {
    let argcs: Vec<usize> = queries.iter().map(Vec::len).collect();
    let mut args = Vec::with_capacity(argcs.iter().sum());

    for (command, query) in queries.iter().enumerate() {
        for (argument, expr) in query.iter().enumerate() {
            let value = match expr.as_literal() {
                Some(bytes) => Cow::Borrowed(bytes),
                None => Cow::Owned(expr.resolve(ctx)?),
            };
            if trace_arguments {
                trace!(
                    command,
                    argument,
                    value = %String::from_utf8_lossy(&value),
                    "resolved query argument"
                );
            }
            args.push(value);
        }
    }

    encode_flat(&argcs, &args)
}

fn finish(buf: BytesMut, computed: usize) -> GatewayResult<Bytes> {
    let written = buf.len();
    if written != computed {
        error!(computed, written, "redis query buffer size mismatch");
        return Err(GatewayError::EncoderSizeMismatch { computed, written });
    }
    Ok(buf.freeze())
}

fn push_usize(out: &mut BytesMut, mut value: usize) {
    // Digits land in a stack buffer in reverse, then copy out in order.
    let mut buf = [0u8; 20];
    let mut len = 0;
    loop {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
        if value == 0 {
            break;
        }
    }
    buf[..len].reverse();
    out.put_slice(&buf[..len]);
}
