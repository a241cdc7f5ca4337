use state_machines::state_machine;

state_machine! {
    name: ProvisioningMachine,
    state: ProvisioningState,
    initial: Ready,
    states: [Ready, CorpusResolved, AssetsUploaded, IndexReady, AssetsTransformed, Queried, Finished, Failed],
    events {
        resolve_corpus { transition: { from: Ready, to: CorpusResolved } }
        upload { transition: { from: CorpusResolved, to: AssetsUploaded } }
        build_index { transition: { from: AssetsUploaded, to: IndexReady } }
        transform { transition: { from: IndexReady, to: AssetsTransformed } }
        query { transition: { from: AssetsTransformed, to: Queried } }
        finish { transition: { from: Queried, to: Finished } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: CorpusResolved, to: Failed }
            transition: { from: AssetsUploaded, to: Failed }
            transition: { from: IndexReady, to: Failed }
            transition: { from: AssetsTransformed, to: Failed }
            transition: { from: Queried, to: Failed }
            transition: { from: Finished, to: Failed }
        }
    }
}

pub fn ready() -> ProvisioningMachine<(), Ready> {
    ProvisioningMachine::new(())
}
