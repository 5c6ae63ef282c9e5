/*!

# Quick start

This example runs a small estimation session end to end with the replay
binary, without any peer network.

**Describing the session** Create a file `planning.json`:

```text
{
  "sessionName": "kickoff",
  "rules": { "randomSeed": "42" },
  "participants": [
    { "name": "anna", "admin": true },
    { "name": "bob" }
  ],
  "script": [
    { "action": "addItem", "participant": "anna", "text": "Docs: write the guide" },
    { "action": "voteForTop", "participant": "anna", "selection": ["anna0"] },
    { "action": "voteForTop", "participant": "bob", "selection": ["anna0"] },
    { "action": "estimate", "participant": "anna", "value": "Geld,100" },
    { "action": "estimate", "participant": "bob", "value": "Zeit,2,3" }
  ]
}
```

**Replaying it** Run:

```bash
destimate --config planning.json
```

The program replays the script against an in-memory replica and prints the
aggregated summary. `anna0` ends up with two finished estimates, an average
of 200 (the time estimate normalizes to `50 * 2 * 3 = 300` money units) and
the median estimate `Zeit,2,3`.

**Checking against a reference** Store a known-good summary and pass it with
`--reference known_good.json`; the program exits non-zero and prints a diff
when the replayed outcome deviates. The tests of this repository use exactly
that mechanism over the scenarios in `test_data/`.

**Embedding the library** The same session logic is available directly:

```
use std::rc::Rc;
use estimation_voting::builder::ParticipantBuilder;
use estimation_voting::estimate::Estimate;
use estimation_voting::store::MemoryStore;

let store = Rc::new(MemoryStore::new());
let mut anna = ParticipantBuilder::new(store, "anna")
    .admin(true)
    .clean(true)
    .build()?;

let item = anna.add_item("Docs: write the guide");
anna.vote_for_top(&[item.clone()])?;
anna.save_estimate(&Estimate::Money(100.0))?;

let summary = anna.vote_summary();
assert_eq!(summary.item(&item).unwrap().average_estimate(), 100.0);
# Ok::<(), estimation_voting::EstimationError>(())
```

A live deployment swaps `MemoryStore` for an adapter over the replicated
peer-to-peer store and registers an `on_change` callback to re-render when
the replica moves.

*/
