use std::ptr::NonNull;

use firstfit::{FixedRegion, HEADER_SIZE, Heap, Region, State};
use test_log::test;

fn heap() -> Heap<FixedRegion> {
  Heap::new(FixedRegion::with_capacity(64 * 1024))
}

fn make_array(
  heap: &mut Heap<FixedRegion>,
  length: usize,
) -> Option<NonNull<u8>> {
  let ptr = heap.allocate(length * size_of::<i32>())?;
  let ints = ptr.cast::<i32>();

  for i in 0..length {
    unsafe { ints.add(i).write(i as i32 + 1) };
  }

  Some(ptr)
}

fn free(
  heap: &mut Heap<FixedRegion>,
  ptr: Option<NonNull<u8>>,
) {
  unsafe { heap.release(ptr) };
  heap.check().unwrap();
}

fn free_sizes(heap: &Heap<FixedRegion>) -> Vec<u32> {
  heap
    .blocks()
    .filter(|block| block.state == State::Free)
    .map(|block| block.size)
    .collect()
}

fn layout(heap: &Heap<FixedRegion>) -> Vec<(u32, State)> {
  heap.blocks().map(|block| (block.size, block.state)).collect()
}

#[test]
fn writing_then_freeing_in_reverse() {
  let mut heap = heap();
  let start = heap.region().len();

  let a = make_array(&mut heap, 10).unwrap();
  let b = make_array(&mut heap, 10).unwrap();

  for i in 0..10 {
    unsafe {
      assert_eq!(a.cast::<i32>().add(i).read(), i as i32 + 1);
      assert_eq!(b.cast::<i32>().add(i).read(), i as i32 + 1);
    }
  }

  free(&mut heap, Some(b));
  free(&mut heap, Some(a));

  assert_eq!(heap.region().len(), start);
}

#[test]
fn reuse_splits_and_coalesces() {
  let mut heap = heap();
  let start = heap.region().len();

  let a = make_array(&mut heap, 20);
  let b = make_array(&mut heap, 20);
  free(&mut heap, a);

  assert_eq!(layout(&heap), vec![(80, State::Free), (80, State::Taken)]);

  let c = make_array(&mut heap, 10);
  assert_eq!(c, a);
  assert_eq!(
    layout(&heap),
    vec![
      (40, State::Taken),
      (80 - HEADER_SIZE as u32 - 40, State::Free),
      (80, State::Taken)
    ]
  );

  free(&mut heap, c);
  assert_eq!(layout(&heap), vec![(80, State::Free), (80, State::Taken)]);

  free(&mut heap, b);
  assert_eq!(heap.region().len(), start);
}

#[test]
fn first_fit_picks_the_earliest_block() {
  let mut heap = heap();
  let start = heap.region().len();

  let a = make_array(&mut heap, 10);
  let div1 = make_array(&mut heap, 1);
  let b = make_array(&mut heap, 20);
  let div2 = make_array(&mut heap, 1);
  let c = make_array(&mut heap, 30);
  let div3 = make_array(&mut heap, 1);
  let d = make_array(&mut heap, 40);
  let div4 = make_array(&mut heap, 1);
  let e = make_array(&mut heap, 50);
  let div5 = make_array(&mut heap, 1);

  for ptr in [a, b, c, d, e] {
    free(&mut heap, ptr);
  }

  assert_eq!(free_sizes(&heap), vec![40, 80, 120, 160, 200]);

  let should_be_c = make_array(&mut heap, 30);
  assert_eq!(should_be_c, c);

  let should_be_a = make_array(&mut heap, 10);
  assert_eq!(should_be_a, a);

  let should_be_b = make_array(&mut heap, 10);
  assert_eq!(should_be_b, b);
  assert!(should_be_b < div5);

  for ptr in [should_be_a, should_be_b, should_be_c, div1, div2, div3, div4, div5] {
    free(&mut heap, ptr);
  }

  assert_eq!(heap.region().len(), start);
}

#[test]
fn first_fit_ignores_tighter_later_blocks() {
  let mut heap = heap();

  let small = make_array(&mut heap, 10);
  let _div1 = make_array(&mut heap, 1);
  let large = make_array(&mut heap, 50);
  let _div2 = make_array(&mut heap, 1);
  let exact = make_array(&mut heap, 20);
  let _div3 = make_array(&mut heap, 1);

  for ptr in [small, large, exact] {
    free(&mut heap, ptr);
  }

  // 80 bytes fit the third block exactly, but the second one comes first.
  assert_eq!(make_array(&mut heap, 20), large);
}

#[test]
fn coalescing_from_the_front() {
  let mut heap = heap();
  let start = heap.region().len();

  let a = make_array(&mut heap, 10);
  let b = make_array(&mut heap, 10);
  let c = make_array(&mut heap, 10);
  let d = make_array(&mut heap, 10);
  let e = make_array(&mut heap, 10);

  free(&mut heap, a);
  assert_eq!(free_sizes(&heap), vec![40]);
  free(&mut heap, b);
  assert_eq!(free_sizes(&heap), vec![96]);
  free(&mut heap, c);
  assert_eq!(free_sizes(&heap), vec![152]);
  free(&mut heap, d);
  assert_eq!(free_sizes(&heap), vec![208]);

  let f = make_array(&mut heap, 52);
  assert_eq!(f, a);

  free(&mut heap, f);
  free(&mut heap, e);

  assert_eq!(heap.region().len(), start);
}

#[test]
fn coalescing_with_both_neighbours() {
  let mut heap = heap();
  let start = heap.region().len();

  let a = make_array(&mut heap, 10);
  let b = make_array(&mut heap, 10);
  let c = make_array(&mut heap, 10);
  let d = make_array(&mut heap, 10);
  let e = make_array(&mut heap, 10);

  free(&mut heap, b);
  assert_eq!(free_sizes(&heap), vec![40]);
  free(&mut heap, d);
  assert_eq!(free_sizes(&heap), vec![40, 40]);
  free(&mut heap, a);
  assert_eq!(free_sizes(&heap), vec![96, 40]);
  free(&mut heap, c);
  assert_eq!(free_sizes(&heap), vec![208]);
  free(&mut heap, e);

  assert_eq!(heap.blocks().count(), 0);
  assert_eq!(heap.region().len(), start);
}

#[test]
fn coalescing_at_both_ends() {
  let mut heap = heap();
  let start = heap.region().len();

  let a = make_array(&mut heap, 10);
  let b = make_array(&mut heap, 10);
  let c = make_array(&mut heap, 10);
  let d = make_array(&mut heap, 10);
  let e = make_array(&mut heap, 10);

  free(&mut heap, b);
  assert_eq!(
    layout(&heap),
    vec![
      (40, State::Taken),
      (40, State::Free),
      (40, State::Taken),
      (40, State::Taken),
      (40, State::Taken)
    ]
  );
  free(&mut heap, a);
  assert_eq!(free_sizes(&heap), vec![96]);
  free(&mut heap, d);
  assert_eq!(free_sizes(&heap), vec![96, 40]);
  free(&mut heap, e);
  assert_eq!(layout(&heap), vec![(96, State::Free), (40, State::Taken)]);
  free(&mut heap, c);

  assert_eq!(heap.region().len(), start);
}

#[test]
fn splitting_only_when_the_remainder_is_useful() {
  let mut heap = heap();
  let start = heap.region().len();

  let medium = make_array(&mut heap, 64);
  let holder = make_array(&mut heap, 4);
  free(&mut heap, medium);

  // 228 rounds to 232, leaving 24 bytes: too few for a header and payload.
  let too_big = make_array(&mut heap, 57);
  assert_eq!(too_big, medium);
  assert_eq!(layout(&heap), vec![(256, State::Taken), (16, State::Taken)]);

  free(&mut heap, too_big);

  let tiny1 = make_array(&mut heap, 4);
  assert_eq!(free_sizes(&heap), vec![224]);
  let tiny2 = make_array(&mut heap, 4);
  assert_eq!(free_sizes(&heap), vec![192]);
  let tiny3 = make_array(&mut heap, 4);
  assert_eq!(free_sizes(&heap), vec![160]);
  let tiny4 = make_array(&mut heap, 4);
  assert_eq!(free_sizes(&heap), vec![128]);

  let step = |ptr: Option<NonNull<u8>>| ptr.map(|ptr| unsafe { ptr.add(32) });

  assert_eq!(tiny1, medium);
  assert_eq!(tiny2, step(tiny1));
  assert_eq!(tiny3, step(tiny2));
  assert_eq!(tiny4, step(tiny3));

  for ptr in [tiny1, tiny2, tiny3, tiny4, holder] {
    free(&mut heap, ptr);
  }

  assert_eq!(heap.region().len(), start);
}

#[test]
fn mixed_order_driver() {
  let mut heap = heap();
  let start = heap.region().len();

  let value = heap.allocate(4);
  let value2 = heap.allocate(4);
  let value3 = heap.allocate(4);
  let myptr = heap.allocate(100);
  let value4 = heap.allocate(4);
  free(&mut heap, myptr);

  let value5 = heap.allocate(4);
  assert_eq!(value5, myptr);

  for ptr in [value, value2, value3, value4, value5] {
    free(&mut heap, ptr);
  }

  assert_eq!(heap.region().len(), start);
}

/// Heap's algorithm; calls `visit` once for every ordering of `items`.
fn permutations(
  items: &mut [usize],
  k: usize,
  visit: &mut dyn FnMut(&[usize]),
) {
  if k <= 1 {
    visit(items);
    return;
  }

  permutations(items, k - 1, visit);

  for i in 0..k - 1 {
    if k % 2 == 0 {
      items.swap(i, k - 1);
    } else {
      items.swap(0, k - 1);
    }
    permutations(items, k - 1, visit);
  }
}

#[test]
fn any_release_order_reclaims_everything() {
  let sizes = [1usize, 24, 100, 16, 250];
  let mut order: Vec<usize> = (0..sizes.len()).collect();
  let mut runs = 0;

  permutations(&mut order, sizes.len(), &mut |order| {
    let mut heap = heap();
    let ptrs: Vec<_> = sizes.iter().map(|&size| heap.allocate(size)).collect();

    for &i in order {
      free(&mut heap, ptrs[i]);
    }

    assert_eq!(heap.region().len(), 0, "release order {order:?}");
    runs += 1;
  });

  assert_eq!(runs, 120);
}

#[test]
fn live_blocks_never_overlap() {
  let mut heap = heap();
  let mut live = Vec::new();

  for round in 0..200usize {
    if round % 3 == 2 && !live.is_empty() {
      let ptr = live.remove((round * 7) % live.len());
      free(&mut heap, Some(ptr));
    } else {
      live.push(heap.allocate(1 + (round * 37) % 300).unwrap());
    }

    let base = heap.region().base().as_ptr() as usize;
    let mut end = base;

    for block in heap.blocks() {
      let data = block.data.as_ptr() as usize;
      assert_eq!(data, end + HEADER_SIZE);
      end = data + block.size as usize;
    }

    assert_eq!(end, base + heap.region().len());
  }

  for ptr in live {
    free(&mut heap, Some(ptr));
  }

  assert_eq!(heap.region().len(), 0);
}

#[test]
fn failed_growth_is_not_observable() {
  let mut heap = Heap::new(FixedRegion::with_capacity(256));
  let a = heap.allocate(100);
  let before = heap.to_string();

  assert_eq!(heap.allocate(200), None);
  assert_eq!(heap.to_string(), before);

  free(&mut heap, a);
  assert!(heap.allocate(200).is_some());
}
