//! Byte-exact argument encoding for the vault program's instructions.
//!
//! Every payload is an 8-byte Anchor discriminator followed by the borsh
//! encoding of the call's arguments: scalars little-endian at their declared
//! width, byte vectors as a `u32` little-endian length and the raw bytes.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::pubkey::Pubkey;
use thiserror::Error;

pub const COVER_FEE_DISCRIMINATOR: [u8; 8] = [64, 23, 219, 120, 75, 63, 68, 190];
pub const SWAP_TO_SETTLEMENT_DISCRIMINATOR: [u8; 8] = [73, 17, 223, 215, 78, 128, 160, 80];
pub const SWAP_FEE_TO_NATIVE_DISCRIMINATOR: [u8; 8] = [98, 85, 227, 2, 32, 184, 191, 80];

pub const DISCRIMINATOR_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("payload of {0} bytes is shorter than a discriminator")]
    Truncated(usize),

    #[error("unknown discriminator {0:?}")]
    UnknownDiscriminator([u8; 8]),

    #[error("route payload of {0} bytes does not fit a u32 length prefix")]
    RouteTooLong(usize),

    #[error("malformed arguments: {0}")]
    Malformed(String),
}

/// Anchor's discriminator: the first 8 bytes of `sha256("{namespace}:{name}")`.
pub fn get_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let preimage = format!("{namespace}:{name}");
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&solana_program::hash::hash(preimage.as_bytes()).to_bytes()[..8]);
    discriminator
}

/// Arguments shared by both swap calls.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SwapArgs {
    pub amount_in: u64,
    pub min_amount_out: u64,
    pub route: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
struct CoverFeeArgs {
    fee_amount: u64,
}

/// A decoded call into the vault program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VaultCall {
    CoverFee { fee_amount: u64 },
    SwapToSettlement(SwapArgs),
    SwapFeeToNative(SwapArgs),
}

impl VaultCall {
    pub fn discriminator(&self) -> [u8; 8] {
        match self {
            VaultCall::CoverFee { .. } => COVER_FEE_DISCRIMINATOR,
            VaultCall::SwapToSettlement(_) => SWAP_TO_SETTLEMENT_DISCRIMINATOR,
            VaultCall::SwapFeeToNative(_) => SWAP_FEE_TO_NATIVE_DISCRIMINATOR,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VaultCall::CoverFee { .. } => "cover_transaction_fees",
            VaultCall::SwapToSettlement(_) => "swap_to_cbbtc",
            VaultCall::SwapFeeToNative(_) => "swap_fee_to_sol",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        let mut data = Vec::with_capacity(DISCRIMINATOR_LEN + self.args_len());
        data.extend_from_slice(&self.discriminator());
        let args = match self {
            VaultCall::CoverFee { fee_amount } => borsh::to_vec(&CoverFeeArgs {
                fee_amount: *fee_amount,
            }),
            VaultCall::SwapToSettlement(args) | VaultCall::SwapFeeToNative(args) => {
                if u32::try_from(args.route.len()).is_err() {
                    return Err(EncodingError::RouteTooLong(args.route.len()));
                }
                borsh::to_vec(args)
            }
        }
        .map_err(|e| EncodingError::Malformed(e.to_string()))?;
        data.extend_from_slice(&args);
        Ok(data)
    }

    /// Strict inverse of [`VaultCall::encode`]; trailing bytes are rejected.
    pub fn decode(data: &[u8]) -> Result<Self, EncodingError> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(EncodingError::Truncated(data.len()));
        }
        let (head, body) = data.split_at(DISCRIMINATOR_LEN);
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(head);

        let malformed = |e: std::io::Error| EncodingError::Malformed(e.to_string());
        match discriminator {
            COVER_FEE_DISCRIMINATOR => {
                let args = CoverFeeArgs::try_from_slice(body).map_err(malformed)?;
                Ok(VaultCall::CoverFee {
                    fee_amount: args.fee_amount,
                })
            }
            SWAP_TO_SETTLEMENT_DISCRIMINATOR => Ok(VaultCall::SwapToSettlement(
                SwapArgs::try_from_slice(body).map_err(malformed)?,
            )),
            SWAP_FEE_TO_NATIVE_DISCRIMINATOR => Ok(VaultCall::SwapFeeToNative(
                SwapArgs::try_from_slice(body).map_err(malformed)?,
            )),
            other => Err(EncodingError::UnknownDiscriminator(other)),
        }
    }

    pub fn into_instruction(
        self,
        program_id: Pubkey,
        accounts: Vec<AccountMeta>,
    ) -> Result<Instruction, EncodingError> {
        Ok(Instruction {
            program_id,
            accounts,
            data: self.encode()?,
        })
    }

    fn args_len(&self) -> usize {
        match self {
            VaultCall::CoverFee { .. } => 8,
            VaultCall::SwapToSettlement(args) | VaultCall::SwapFeeToNative(args) => {
                8 + 8 + 4 + args.route.len()
            }
        }
    }
}
