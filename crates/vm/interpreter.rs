//! The `Interpreter` trait: the abstract entry point through which
//! `ledger-blockchain`'s `create`/`call` (`spec.md` §4.4) drive contract
//! byte-code. The real byte-code interpreter is out of scope (`spec.md`
//! §1 Non-goals) and lives outside this workspace; `MinimalInterpreter`
//! here is a stand-in used only by this crate's own tests.

use ethereum_types::Address;

use crate::host::{Host, HostError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub address: Address,
    pub gas_used: u64,
    pub reverted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub return_data: Vec<u8>,
    pub gas_used: u64,
    pub reverted: bool,
}

/// Driven by `ledger-blockchain`'s execution path; never by `Host` itself.
/// An interpreter runs against a `Host` and reports what it spent and
/// whether it reverted — the caller (`ledger-blockchain`) owns opening and
/// closing the checkpoint around the call.
pub trait Interpreter {
    fn create(
        &self,
        host: &mut dyn Host,
        caller: Address,
        value: ethereum_types::U256,
        init_code: &[u8],
        gas: u64,
    ) -> Result<CreateOutcome, HostError>;

    fn call(
        &self,
        host: &mut dyn Host,
        caller: Address,
        callee: Address,
        value: ethereum_types::U256,
        input: &[u8],
        gas: u64,
    ) -> Result<CallOutcome, HostError>;
}

/// Treats `init_code`/`input` as opaque and performs no real execution: it
/// deterministically derives a contract address from `caller`'s nonce (the
/// way `spec.md` §4.4 describes, without committing to an address-derivation
/// scheme) and moves `value`, exercising the `Host` contract end to end
/// without needing an actual byte-code engine.
pub struct MinimalInterpreter;

impl Interpreter for MinimalInterpreter {
    fn create(
        &self,
        host: &mut dyn Host,
        caller: Address,
        value: ethereum_types::U256,
        init_code: &[u8],
        gas: u64,
    ) -> Result<CreateOutcome, HostError> {
        let nonce = host.nonce(&caller);
        let mut seed = [0u8; 32];
        seed[..20].copy_from_slice(caller.as_bytes());
        seed[20..24].copy_from_slice(&nonce.low_u32().to_be_bytes());
        let address = Address::from_slice(&seed[0..20]);

        if !value.is_zero() {
            host.sub_balance(&caller, value)?;
            host.add_balance(&address, value);
        }
        host.set_code(&address, init_code.to_vec());

        Ok(CreateOutcome { address, gas_used: gas.min(init_code.len() as u64), reverted: false })
    }

    fn call(
        &self,
        host: &mut dyn Host,
        caller: Address,
        callee: Address,
        value: ethereum_types::U256,
        input: &[u8],
        gas: u64,
    ) -> Result<CallOutcome, HostError> {
        if !value.is_zero() {
            host.sub_balance(&caller, value)?;
            host.add_balance(&callee, value);
        }
        Ok(CallOutcome { return_data: input.to_vec(), gas_used: gas.min(1), reverted: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MinimalHost;
    use ethereum_types::U256;

    #[test]
    fn create_moves_value_and_sets_code() {
        let mut host = MinimalHost::new();
        let caller = Address::from_low_u64_be(1);
        host.set_balance(caller, U256::from(100u64));

        let interpreter = MinimalInterpreter;
        let outcome = interpreter
            .create(&mut host, caller, U256::from(10u64), &[0x60, 0x00], 21_000)
            .unwrap();

        assert_eq!(host.balance(&caller), U256::from(90u64));
        assert_eq!(host.balance(&outcome.address), U256::from(10u64));
        assert_eq!(host.code(&outcome.address), vec![0x60, 0x00]);
    }

    #[test]
    fn call_rejects_overdraft_without_mutating_host() {
        let mut host = MinimalHost::new();
        let caller = Address::from_low_u64_be(1);
        let callee = Address::from_low_u64_be(2);

        let interpreter = MinimalInterpreter;
        let err = interpreter
            .call(&mut host, caller, callee, U256::from(5u64), &[], 21_000)
            .unwrap_err();

        assert_eq!(err, HostError::InsufficientBalance(caller));
        assert_eq!(host.balance(&callee), U256::zero());
    }
}
