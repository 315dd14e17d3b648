use super::{Transform, TransformError};
use crate::cipher::{self, EncryptionKey};
use crate::context::RewriteContext;
use crate::random::random_ident;
use crate::scanner::{self, Piece};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

/// Helper id under which the RC4 decoder is recorded in the context.
const RC4_HELPER: &str = "rc4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Xor,
    Rc4,
}

/// Replaces static literals with base64 ciphertext wrapped in a decode
/// expression that yields the original value at run time.
///
/// RC4 literals all call one decoder function injected at the top of the script
/// the first time any RC4 pass in the run needs it.
#[derive(Debug, Clone)]
pub struct StringEncryptTransform {
    pub cipher: Cipher,
    pub key: Vec<u8>,
}

impl StringEncryptTransform {
    pub fn new(cipher: Cipher, key: &EncryptionKey) -> Self {
        Self {
            cipher,
            key: key.as_bytes().to_vec(),
        }
    }

    fn key_bytes_expr(&self) -> String {
        format!(
            "0..({}-1)|%{{[Convert]::ToByte('{}'.Substring($_*2,2),16)}}",
            self.key.len(),
            hex::encode_upper(&self.key)
        )
    }

    fn xor_expr(&self, payload: &str) -> String {
        format!(
            "(&{{[byte[]]$__k={};[byte[]]$__b=[Convert]::FromBase64String('{payload}');\
             for($__i=0;$__i -lt $__b.Length;$__i++){{$__b[$__i]=$__b[$__i] -bxor $__k[$__i%$__k.Length]}};\
             [Text.Encoding]::UTF8.GetString($__b)}})",
            self.key_bytes_expr()
        )
    }

    fn rc4_expr(&self, decoder: &str, payload: &str) -> String {
        format!(
            "({decoder} ([byte[]]({})) ([Convert]::FromBase64String('{payload}')))",
            self.key_bytes_expr()
        )
    }
}

fn rc4_decoder(name: &str) -> String {
    format!(
        "function {name}($k,[byte[]]$d){{$s=0..255;$j=0;for($i=0;$i -lt 256;$i++){{\
         $j=($j+$s[$i]+$k[$i%$k.Length])%256;$t=$s[$i];$s[$i]=$s[$j];$s[$j]=$t}}\
         $i=0;$j=0;for($x=0;$x -lt $d.Length;$x++){{\
         $i=($i+1)%256;$j=($j+$s[$i])%256;$t=$s[$i];$s[$i]=$s[$j];$s[$j]=$t;\
         $d[$x]=$d[$x] -bxor $s[($s[$i]+$s[$j])%256]}}\
         [Text.Encoding]::UTF8.GetString($d)}}"
    )
}

impl Transform for StringEncryptTransform {
    fn name(&self) -> &'static str {
        "string-encrypt"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        if self.key.is_empty() {
            return Err(TransformError::EmptyKey);
        }
        // (routine name, whether this pass must inject it)
        let decoder = match self.cipher {
            Cipher::Xor => None,
            Cipher::Rc4 => match ctx.helper(RC4_HELPER).map(str::to_string) {
                Some(existing) => Some((existing, false)),
                None => Some((format!("__dec{}", random_ident(&mut ctx.rng, 6)), true)),
            },
        };

        let spans = scanner::literal_spans(text);
        let mut encrypted = 0usize;
        let mut out = String::with_capacity(text.len() * 2);
        for piece in scanner::pieces(text, &spans) {
            match piece {
                Piece::Code(code) => out.push_str(code),
                Piece::Literal(span, raw) => {
                    let value = span.value(text);
                    if !span.is_static(text) || value.is_empty() {
                        out.push_str(raw);
                        continue;
                    }
                    let expr = match (&decoder, self.cipher) {
                        (Some((name, _)), Cipher::Rc4) => self.rc4_expr(
                            name,
                            &STANDARD.encode(cipher::rc4(value.as_bytes(), &self.key)),
                        ),
                        _ => self.xor_expr(&STANDARD.encode(cipher::xor(value.as_bytes(), &self.key))),
                    };
                    out.push_str(&expr);
                    encrypted += 1;
                }
            }
        }
        debug!(cipher = ?self.cipher, literals = encrypted, "encrypted string literals");

        match decoder {
            Some((name, true)) if encrypted > 0 => {
                debug!(routine = %name, "injecting rc4 decoder");
                let injected = format!("{}\n{out}", rc4_decoder(&name));
                ctx.mark_helper(RC4_HELPER, name);
                Ok(injected)
            }
            _ => Ok(out),
        }
    }
}
