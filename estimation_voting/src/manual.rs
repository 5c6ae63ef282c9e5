/*!

This is the long-form manual for `estimation_voting` and `destimate`.

## Shared data layout

A session lives in five replicated tables of string records. Every peer
holds a local replica; the core never coordinates writes, it only re-derives
its view when the replica changes.

| table | key | value |
|----------------|--------------------------|--------------------------------------|
| `items` | `<contributor><sequence>` | the submitted free text |
| `topVotes` | participant name | comma-joined list of item ids |
| `estimates` | `<participant>_for_<item>` | `pending`, `unknown` or an encoded estimate |
| `state` | `state` | `running` or `ended` |
| `dotsPerVoter` | `dotsPerVoter` | the per-voter selection quota |

An item's optional label is part of its text: everything up to and including
the first colon is displayed bold. Item records are immutable and never
deleted.

## Estimate encoding

Finalized estimates are `category,component[,component]`:

* `Geld,<amount>` — a monetary estimate; its value is the amount itself.
* `Zeit,<duration>,<persons>` — a time estimate; its value is
  `50 * duration * persons`, expressing the time in money units.
* `unknown` — an explicit abstention. Recorded, but excluded from the
  averages, the median and the spread.
* `pending` — reserved while a participant is considering the item. Written
  by the selection heuristic, overwritten by the final estimate.

Any other category decodes to value 0 and still counts as a cast estimate.
Numeric components that fail to parse become `NaN` and show up as such in
the affected item's statistics.

## Session files

`destimate` replays a recorded session from a JSON description:

```text
{
  "sessionName": "sprint planning",
  "rules": {
    "dotsPerVoter": 4,
    "randomSeed": "7",
    "estimation": true
  },
  "participants": [
    { "name": "anna", "admin": true },
    { "name": "bob" }
  ],
  "script": [
    { "action": "addItemBlock", "participant": "anna",
      "text": "Docs: write the guide\n\nRefactor the login flow" },
    { "action": "voteForTop", "participant": "bob", "selection": ["anna0"] },
    { "action": "estimate", "participant": "bob", "value": "Geld,100" },
    { "action": "estimateUnknown", "participant": "anna" },
    { "action": "setState", "participant": "anna", "state": "ended" }
  ]
}
```

Actions are applied in order against one shared in-memory replica:

* `addItem` / `addItemBlock` — submit one item, or a block of items
  separated by blank lines.
* `voteForTop` — cast the participant's ranking; this also starts their
  estimation loop.
* `estimate` — finalize the given value for the participant's currently
  active item (the item was picked by the selection heuristic, so scripts
  that depend on exact outcomes should pin `randomSeed` or keep a single
  open candidate per step).
* `estimateUnknown` — record an explicit abstention for the active item.
* `setState` — flip the shared lifecycle flag (`running`/`ended`).

With `"estimation": false` the session is a plain dot-voting round: votes
are tallied and no estimation loop runs.

Items can also be imported from a spreadsheet before the script runs, one
item text per row:

```text
"itemFileSources": [
  { "provider": "xlsx", "filePath": "agenda.xlsx",
    "contributor": "anna", "itemColumnIndex": 1, "firstItemRowIndex": 2 }
]
```

## Summary output

The replay prints (or writes with `--out`) a JSON summary: session-level
figures under `config` and one entry per item under `results`, ordered by
descending vote count. With `--reference` the summary is compared against a
recorded expectation and the program fails on any difference, printing a
diff.

*/
